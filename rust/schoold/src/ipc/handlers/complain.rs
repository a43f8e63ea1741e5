use crate::auth::{Role, Session};
use crate::db::now_rfc3339;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, list_or_message, parse_date, require_role, require_school,
};
use crate::ipc::records::require_student;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn complain_create(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Student])?;
    let complaint = get_required_str(params, "complaint")?;
    let date = match get_optional_str(params, "date")? {
        Some(raw) => parse_date(&raw)?,
        None => chrono::Utc::now().date_naive(),
    };
    let student = require_student(&state.db, &session.user_id)?;

    let complain_id = Uuid::new_v4().to_string();
    let date_key = date.format("%Y-%m-%d").to_string();
    state.db.execute(
        "INSERT INTO complains(id, school_id, student_id, date, complaint, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &complain_id,
            &student.school_id,
            &student.id,
            &date_key,
            &complaint,
            now_rfc3339(),
        ),
    )?;
    tracing::info!(complain_id = %complain_id, student_id = %student.id, "complaint filed");

    Ok(json!({
        "id": complain_id,
        "schoolId": student.school_id,
        "user": { "id": student.id, "name": student.name },
        "date": date_key,
        "complaint": complaint,
    }))
}

fn complain_list(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let school_id = get_required_str(params, "id")?;
    require_school(session, &school_id)?;

    let mut stmt = state.db.prepare(
        "SELECT c.id, c.school_id, c.student_id, s.name, c.date, c.complaint
         FROM complains c
         JOIN students s ON s.id = c.student_id
         WHERE c.school_id = ?
         ORDER BY c.date DESC, c.created_at DESC",
    )?;
    let rows = stmt
        .query_map([&school_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "schoolId": r.get::<_, String>(1)?,
                "user": { "id": r.get::<_, String>(2)?, "name": r.get::<_, String>(3)? },
                "date": r.get::<_, String>(4)?,
                "complaint": r.get::<_, String>(5)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(list_or_message(rows, "complains"))
}

pub fn try_handle(state: &mut AppState, session: &Session, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "complain.create" => complain_create(state, session, &req.params),
        "complain.list" => complain_list(state, session, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
