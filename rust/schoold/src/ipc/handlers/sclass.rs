use crate::auth::{Role, Session};
use crate::db::now_rfc3339;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_required_str, list_or_message, require_class_in_school, require_role, require_school,
};
use crate::ipc::records::list_students_for_class;
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn sclass_create(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let name = get_required_str(params, "sclassName")?;
    let conn = &state.db;

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sclasses WHERE school_id = ? AND name = ?",
            (&session.school_id, &name),
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(HandlerErr::conflict("Sorry this class name already exists"));
    }

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sclasses(id, school_id, name, created_at) VALUES(?, ?, ?, ?)",
        (&class_id, &session.school_id, &name, now_rfc3339()),
    )?;
    tracing::info!(class_id = %class_id, name = %name, "class created");

    Ok(json!({ "id": class_id, "name": name, "schoolId": session.school_id }))
}

fn sclass_list(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_id = get_required_str(params, "id")?;
    require_school(session, &school_id)?;

    // Correlated subqueries keep the counts from multiplying each other.
    let mut stmt = state.db.prepare(
        "SELECT
           c.id,
           c.name,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM subjects sub WHERE sub.class_id = c.id) AS subject_count
         FROM sclasses c
         WHERE c.school_id = ?
         ORDER BY c.name",
    )?;
    let classes = stmt
        .query_map([&school_id], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "studentCount": row.get::<_, i64>(2)?,
                "subjectCount": row.get::<_, i64>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(list_or_message(classes, "sclasses"))
}

fn sclass_get(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "id")?;
    let row: Option<(String, String, String)> = state
        .db
        .query_row(
            "SELECT c.name, c.school_id, a.school_name
             FROM sclasses c
             JOIN admins a ON a.id = c.school_id
             WHERE c.id = ?",
            [&class_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((name, school_id, school_name)) = row else {
        return Err(HandlerErr::not_found("class"));
    };
    require_school(session, &school_id)?;

    Ok(json!({
        "id": class_id,
        "name": name,
        "schoolId": school_id,
        "schoolName": school_name,
    }))
}

fn sclass_students(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin, Role::Teacher])?;
    let class_id = get_required_str(params, "id")?;
    require_class_in_school(&state.db, session, &class_id)?;

    let students = list_students_for_class(&state.db, &class_id)?
        .iter()
        .map(|s| s.to_json())
        .collect();
    Ok(list_or_message(students, "students"))
}

pub fn try_handle(state: &mut AppState, session: &Session, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sclass.create" => sclass_create(state, session, &req.params),
        "sclass.list" => sclass_list(state, session, &req.params),
        "sclass.get" => sclass_get(state, session, &req.params),
        "sclass.students" => sclass_students(state, session, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
