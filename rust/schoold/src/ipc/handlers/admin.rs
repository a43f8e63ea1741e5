use crate::auth::{self, Role, Session};
use crate::calc::exam::{school_performance, StudentMarks};
use crate::db::school_name_taken;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, require_role};
use crate::ipc::records::{list_students_for_school, load_exam_results};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;

fn require_self_admin(session: &Session, admin_id: &str) -> Result<(), HandlerErr> {
    require_role(session, &[Role::Admin])?;
    if session.user_id != admin_id {
        return Err(HandlerErr::forbidden());
    }
    Ok(())
}

fn load_admin_json(conn: &Connection, admin_id: &str) -> Result<serde_json::Value, HandlerErr> {
    conn.query_row(
        "SELECT id, name, email, school_name FROM admins WHERE id = ?",
        [admin_id],
        |r| {
            let id: String = r.get(0)?;
            Ok(json!({
                "id": id,
                "name": r.get::<_, String>(1)?,
                "email": r.get::<_, String>(2)?,
                "schoolName": r.get::<_, String>(3)?,
                "schoolId": id,
                "role": "Admin",
            }))
        },
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("admin"))
}

fn admin_get(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let admin_id = get_required_str(params, "id")?;
    require_self_admin(session, &admin_id)?;
    load_admin_json(&state.db, &admin_id)
}

fn admin_update(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let admin_id = get_required_str(params, "id")?;
    require_self_admin(session, &admin_id)?;
    let conn = &state.db;

    let mut set_parts: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(name) = get_optional_str(params, "name")? {
        set_parts.push("name = ?");
        bind_values.push(Value::Text(name));
    }
    if let Some(email) = get_optional_str(params, "email")? {
        let email = email.to_lowercase();
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM admins WHERE email = ? AND id <> ?",
                (&email, &admin_id),
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(HandlerErr::conflict("Email already exists"));
        }
        set_parts.push("email = ?");
        bind_values.push(Value::Text(email));
    }
    if let Some(school_name) = get_optional_str(params, "schoolName")? {
        if school_name_taken(conn, &school_name, Some(admin_id.as_str()))? {
            return Err(HandlerErr::conflict("School name already exists"));
        }
        set_parts.push("school_name = ?");
        bind_values.push(Value::Text(school_name));
    }
    if let Some(password) = get_optional_str(params, "password")? {
        set_parts.push("password_hash = ?");
        bind_values.push(Value::Text(auth::hash_password(
            &password,
            state.policy.bcrypt_cost,
        )?));
    }

    if !set_parts.is_empty() {
        bind_values.push(Value::Text(admin_id.clone()));
        let sql = format!("UPDATE admins SET {} WHERE id = ?", set_parts.join(", "));
        conn.execute(&sql, params_from_iter(bind_values))?;
    }
    load_admin_json(conn, &admin_id)
}

fn count(conn: &Connection, table: &str, school_id: &str) -> Result<i64, HandlerErr> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE school_id = ?", table);
    Ok(conn.query_row(&sql, [school_id], |r| r.get(0))?)
}

fn admin_dashboard(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_id = get_required_str(params, "id")?;
    require_self_admin(session, &school_id)?;
    let conn = &state.db;

    let students = list_students_for_school(conn, &school_id)?;
    let mut marks = Vec::with_capacity(students.len());
    for s in &students {
        marks.push(StudentMarks {
            student_id: s.id.clone(),
            name: s.name.clone(),
            roll_num: s.roll_num,
            results: load_exam_results(conn, &s.id)?,
        });
    }
    let performance = school_performance(&marks, state.policy.pass_threshold);

    Ok(json!({
        "schoolId": school_id,
        "studentCount": students.len(),
        "classCount": count(conn, "sclasses", &school_id)?,
        "teacherCount": count(conn, "teachers", &school_id)?,
        "subjectCount": count(conn, "subjects", &school_id)?,
        "noticeCount": count(conn, "notices", &school_id)?,
        "complainCount": count(conn, "complains", &school_id)?,
        "passThreshold": state.policy.pass_threshold,
        "performance": performance,
    }))
}

pub fn try_handle(state: &mut AppState, session: &Session, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "admin.get" => admin_get(state, session, &req.params),
        "admin.update" => admin_update(state, session, &req.params),
        "admin.dashboard" => admin_dashboard(state, session, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
