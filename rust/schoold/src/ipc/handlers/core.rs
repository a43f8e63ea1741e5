use crate::auth::{self, Role, Session};
use crate::db::{now_rfc3339, school_name_taken};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_i64, get_required_str};
use crate::ipc::records::load_student;
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

const BAD_LOGIN: &str = "Invalid credentials";

fn handle_health(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "dataDir": state.data_dir.as_ref().map(|p| p.to_string_lossy().to_string())
    }))
}

fn admin_register(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let email = get_required_str(params, "email")?.to_lowercase();
    let password = get_required_str(params, "password")?;
    let school_name = get_required_str(params, "schoolName")?;
    let conn = &state.db;

    let email_taken: Option<i64> = conn
        .query_row("SELECT 1 FROM admins WHERE email = ?", [&email], |r| r.get(0))
        .optional()?;
    if email_taken.is_some() {
        return Err(HandlerErr::conflict("Email already exists"));
    }
    if school_name_taken(conn, &school_name, None)? {
        return Err(HandlerErr::conflict("School name already exists"));
    }

    let hash = auth::hash_password(&password, state.policy.bcrypt_cost)?;
    let admin_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO admins(id, name, email, password_hash, school_name, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&admin_id, &name, &email, &hash, &school_name, now_rfc3339()),
    )?;
    tracing::info!(admin_id = %admin_id, school = %school_name, "admin registered");

    let session = Session {
        user_id: admin_id.clone(),
        role: Role::Admin,
        school_id: admin_id.clone(),
    };
    let token = auth::issue_token(conn, &session)?;
    Ok(json!({
        "id": admin_id,
        "name": name,
        "email": email,
        "schoolName": school_name,
        "schoolId": session.school_id,
        "role": "Admin",
        "token": token,
    }))
}

fn admin_login(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let email = get_required_str(params, "email")?.to_lowercase();
    let password = get_required_str(params, "password")?;
    let conn = &state.db;

    let row: Option<(String, String, String, String)> = conn
        .query_row(
            "SELECT id, name, password_hash, school_name FROM admins WHERE email = ?",
            [&email],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((id, name, hash, school_name)) = row else {
        return Err(HandlerErr::unauthorized(BAD_LOGIN));
    };
    if !auth::verify_password(&password, &hash) {
        return Err(HandlerErr::unauthorized(BAD_LOGIN));
    }

    let session = Session {
        user_id: id.clone(),
        role: Role::Admin,
        school_id: id.clone(),
    };
    let token = auth::issue_token(conn, &session)?;
    Ok(json!({
        "id": id,
        "name": name,
        "email": email,
        "schoolName": school_name,
        "schoolId": session.school_id,
        "role": "Admin",
        "token": token,
    }))
}

fn teacher_login(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let email = get_required_str(params, "email")?.to_lowercase();
    let password = get_required_str(params, "password")?;
    let conn = &state.db;

    let row: Option<(String, String, String, String, String, Option<String>)> = conn
        .query_row(
            "SELECT id, name, password_hash, school_id, class_id, subject_id
             FROM teachers WHERE email = ?",
            [&email],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
        )
        .optional()?;
    let Some((id, name, hash, school_id, class_id, subject_id)) = row else {
        return Err(HandlerErr::unauthorized(BAD_LOGIN));
    };
    if !auth::verify_password(&password, &hash) {
        return Err(HandlerErr::unauthorized(BAD_LOGIN));
    }

    let session = Session {
        user_id: id.clone(),
        role: Role::Teacher,
        school_id: school_id.clone(),
    };
    let token = auth::issue_token(conn, &session)?;
    Ok(json!({
        "id": id,
        "name": name,
        "email": email,
        "schoolId": school_id,
        "teachSclass": class_id,
        "teachSubject": subject_id,
        "role": "Teacher",
        "token": token,
    }))
}

/// Students sign in with roll number, name and password.
fn student_login(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let roll_num = get_required_i64(params, "rollNum")?;
    let name = get_required_str(params, "studentName")?;
    let password = get_required_str(params, "password")?;
    let conn = &state.db;

    let mut stmt = conn.prepare(
        "SELECT id, password_hash FROM students WHERE roll_num = ? AND name = ? ORDER BY created_at",
    )?;
    let candidates = stmt
        .query_map((roll_num, &name), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // Roll numbers repeat across classes; the password picks the student.
    let Some(student_id) = candidates
        .into_iter()
        .find(|(_, hash)| auth::verify_password(&password, hash))
        .map(|(id, _)| id)
    else {
        return Err(HandlerErr::unauthorized(BAD_LOGIN));
    };
    let Some(student) = load_student(conn, &student_id)? else {
        return Err(HandlerErr::unauthorized(BAD_LOGIN));
    };

    let session = Session {
        user_id: student.id.clone(),
        role: Role::Student,
        school_id: student.school_id.clone(),
    };
    let token = auth::issue_token(conn, &session)?;
    let mut out = student.to_json();
    out["token"] = json!(token);
    Ok(out)
}

fn logout(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(token) = req.token.as_deref().and_then(auth::bearer_value) else {
        return Err(HandlerErr::unauthorized("Please authenticate."));
    };
    if !auth::revoke_token(&state.db, token)? {
        return Err(HandlerErr::unauthorized("Please authenticate."));
    }
    Ok(json!({ "message": "Logged out" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state),
        "admin.register" => admin_register(state, &req.params),
        "admin.login" => admin_login(state, &req.params),
        "teacher.login" => teacher_login(state, &req.params),
        "student.login" => student_login(state, &req.params),
        "session.logout" => logout(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
