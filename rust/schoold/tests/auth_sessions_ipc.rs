mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, seed_school, spawn_sidecar, str_field, temp_dir};

#[test]
fn admin_login_logout_and_token_reuse() {
    let workspace = temp_dir("schoold-auth-admin");
    let (_child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let school = seed_school(&mut stdin, &mut reader, "auth");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "admin.login",
        json!({ "email": "head-auth@school.test", "password": "wrong" }),
        None,
    );
    assert_eq!(code, "unauthorized");

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "admin.login",
        json!({ "email": "HEAD-auth@school.test", "password": "admin-pw" }),
        None,
    );
    assert_eq!(str_field(&login, "id"), school.admin_id);
    assert!(login.get("password").is_none());
    assert!(login.get("passwordHash").is_none());
    let token = str_field(&login, "token");
    assert_ne!(token, school.admin_token);

    let bearer = format!("Bearer {}", token);
    let me = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "admin.get",
        json!({ "id": school.admin_id }),
        Some(&bearer),
    );
    assert_eq!(str_field(&me, "schoolName"), "School auth");

    let _ = request_ok(&mut stdin, &mut reader, "4", "session.logout", json!({}), Some(&token));
    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "admin.get",
        json!({ "id": school.admin_id }),
        Some(&token),
    );
    assert_eq!(code, "unauthorized");

    // The seed token is still live.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "admin.get",
        json!({ "id": school.admin_id }),
        Some(&school.admin_token),
    );
}

#[test]
fn registration_conflicts_and_missing_token() {
    let workspace = temp_dir("schoold-auth-register");
    let (_child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let school = seed_school(&mut stdin, &mut reader, "reg");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "admin.register",
        json!({
            "name": "Other",
            "email": "head-reg@school.test",
            "password": "x",
            "schoolName": "Elsewhere",
        }),
        None,
    );
    assert_eq!(code, "conflict");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "admin.register",
        json!({
            "name": "Other",
            "email": "other@school.test",
            "password": "x",
            "schoolName": "School reg",
        }),
        None,
    );
    assert_eq!(code, "conflict");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "sclass.list",
        json!({ "id": school.admin_id }),
        None,
    );
    assert_eq!(code, "unauthorized");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "sclass.list",
        json!({ "id": school.admin_id }),
        Some("not-a-real-token"),
    );
    assert_eq!(code, "unauthorized");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "admin.register",
        json!({ "name": "NoMail", "password": "x", "schoolName": "S" }),
        None,
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn roles_and_schools_are_isolated() {
    let workspace = temp_dir("schoold-auth-roles");
    let (_child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let first = seed_school(&mut stdin, &mut reader, "one");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "admin.dashboard",
        json!({ "id": first.admin_id }),
        Some(&first.student_token),
    );
    assert_eq!(code, "forbidden");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "student.register",
        json!({ "name": "Sneaky", "rollNum": 9, "password": "x", "sclassName": first.class_id }),
        Some(&first.student_token),
    );
    assert_eq!(code, "forbidden");

    let other = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "admin.register",
        json!({
            "name": "Rival",
            "email": "rival@school.test",
            "password": "rival-pw",
            "schoolName": "Rival School",
        }),
        None,
    );
    let rival_token = str_field(&other, "token");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "sclass.get",
        json!({ "id": first.class_id }),
        Some(&rival_token),
    );
    assert_eq!(code, "forbidden");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "student.get",
        json!({ "id": first.student_id }),
        Some(&rival_token),
    );
    assert_eq!(code, "forbidden");

    // A student reads their own record with nested attendance and results.
    let me = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "student.get",
        json!({ "id": first.student_id }),
        Some(&first.student_token),
    );
    assert_eq!(me.get("rollNum").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(me.get("attendance"), Some(&json!([])));
    assert_eq!(me.get("examResult"), Some(&json!([])));
}

#[test]
fn student_login_picks_by_password_when_roll_repeats() {
    let workspace = temp_dir("schoold-auth-student");
    let (_child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let school = seed_school(&mut stdin, &mut reader, "roll");

    let class_b = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "sclass.create",
        json!({ "sclassName": "7B" }),
        Some(&school.admin_token),
    );
    let twin = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "student.register",
        json!({
            "name": "Asha",
            "rollNum": 1,
            "password": "twin-pw",
            "sclassName": str_field(&class_b, "id"),
        }),
        Some(&school.admin_token),
    );

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "student.login",
        json!({ "rollNum": "1", "studentName": "Asha", "password": "twin-pw" }),
        None,
    );
    assert_eq!(str_field(&login, "id"), str_field(&twin, "id"));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "student.login",
        json!({ "rollNum": 1, "studentName": "Asha", "password": "nope" }),
        None,
    );
    assert_eq!(code, "unauthorized");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "student.register",
        json!({ "name": "Dup", "rollNum": 1, "password": "x", "sclassName": school.class_id }),
        Some(&school.admin_token),
    );
    assert_eq!(code, "conflict");
}

#[test]
fn admin_update_changes_profile_and_guards_uniqueness() {
    let workspace = temp_dir("schoold-admin-update");
    let (_child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let north = seed_school(&mut stdin, &mut reader, "north");
    let south = seed_school(&mut stdin, &mut reader, "south");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "admin.update",
        json!({ "id": north.admin_id, "name": "Principal", "email": "Principal@North.test" }),
        Some(&north.admin_token),
    );
    assert_eq!(str_field(&updated, "name"), "Principal");
    assert_eq!(str_field(&updated, "email"), "principal@north.test");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "admin.update",
        json!({ "id": north.admin_id, "email": "head-south@school.test" }),
        Some(&north.admin_token),
    );
    assert_eq!(code, "conflict");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "admin.update",
        json!({ "id": north.admin_id, "schoolName": "School south" }),
        Some(&north.admin_token),
    );
    assert_eq!(code, "conflict");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "admin.update",
        json!({ "id": south.admin_id, "name": "Hijack" }),
        Some(&north.admin_token),
    );
    assert_eq!(code, "forbidden");

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "admin.login",
        json!({ "email": "principal@north.test", "password": "admin-pw" }),
        None,
    );
    assert_eq!(str_field(&login, "id"), north.admin_id);
}
