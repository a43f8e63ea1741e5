mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, seed_school, spawn_sidecar, str_field, temp_dir};

#[test]
fn notices_create_list_update() {
    let workspace = temp_dir("schoold-notices");
    let (_child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let school = seed_school(&mut stdin, &mut reader, "notice");

    let none = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "notice.list",
        json!({ "id": school.admin_id }),
        Some(&school.student_token),
    );
    assert_eq!(none, json!({ "message": "No notices found" }));

    let older = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "notice.create",
        json!({ "title": "Sports day", "details": "Field at 9", "date": "2024-02-10" }),
        Some(&school.admin_token),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "notice.create",
        json!({ "title": "Exams", "details": "Week 12", "date": "2024-03-15" }),
        Some(&school.admin_token),
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "notice.create",
        json!({ "title": "Party", "details": "Hall", "date": "2024-03-20" }),
        Some(&school.student_token),
    );
    assert_eq!(code, "forbidden");

    let list = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "notice.list",
        json!({ "id": school.admin_id }),
        Some(&school.student_token),
    );
    let titles: Vec<&str> = list
        .as_array()
        .expect("notices")
        .iter()
        .filter_map(|n| n.get("title").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(titles, vec!["Exams", "Sports day"]);

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "notice.update",
        json!({ "id": str_field(&older, "id"), "details": "Moved to the gym" }),
        Some(&school.admin_token),
    );
    assert_eq!(str_field(&updated, "details"), "Moved to the gym");
    assert_eq!(str_field(&updated, "title"), "Sports day");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "notice.update",
        json!({ "id": "missing-notice", "title": "x" }),
        Some(&school.admin_token),
    );
    assert_eq!(code, "not_found");
}

#[test]
fn complaints_from_students_reach_the_admin() {
    let workspace = temp_dir("schoold-complains");
    let (_child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let school = seed_school(&mut stdin, &mut reader, "complain");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "complain.create",
        json!({ "complaint": "Admins cannot complain" }),
        Some(&school.admin_token),
    );
    assert_eq!(code, "forbidden");

    let filed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "complain.create",
        json!({ "complaint": "Library closes early", "date": "2024-04-04" }),
        Some(&school.student_token),
    );
    assert_eq!(str_field(&filed, "date"), "2024-04-04");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "complain.list",
        json!({ "id": school.admin_id }),
        Some(&school.student_token),
    );
    assert_eq!(code, "forbidden");

    let list = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "complain.list",
        json!({ "id": school.admin_id }),
        Some(&school.admin_token),
    );
    let rows = list.as_array().expect("complains");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].pointer("/user/name").and_then(|v| v.as_str()),
        Some("Asha")
    );
    assert_eq!(str_field(&rows[0], "complaint"), "Library closes early");
}
