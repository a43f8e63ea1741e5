use crate::auth::{self, Role, Session};
use crate::db::now_rfc3339;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, list_or_message, require_class_in_school, require_role,
    require_school,
};
use crate::ipc::records::require_subject;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct TeacherRow {
    id: String,
    school_id: String,
    name: String,
    email: String,
    class_id: String,
    class_name: String,
    subject_id: Option<String>,
    subject_name: Option<String>,
    subject_sessions: Option<i64>,
}

const TEACHER_SELECT: &str = "SELECT t.id, t.school_id, t.name, t.email, t.class_id, c.name,
            t.subject_id, sub.name, sub.sessions
     FROM teachers t
     JOIN sclasses c ON c.id = t.class_id
     LEFT JOIN subjects sub ON sub.id = t.subject_id";

fn map_teacher(r: &rusqlite::Row<'_>) -> rusqlite::Result<TeacherRow> {
    Ok(TeacherRow {
        id: r.get(0)?,
        school_id: r.get(1)?,
        name: r.get(2)?,
        email: r.get(3)?,
        class_id: r.get(4)?,
        class_name: r.get(5)?,
        subject_id: r.get(6)?,
        subject_name: r.get(7)?,
        subject_sessions: r.get(8)?,
    })
}

fn load_teacher(conn: &Connection, teacher_id: &str) -> Result<TeacherRow, HandlerErr> {
    let sql = format!("{} WHERE t.id = ?", TEACHER_SELECT);
    conn.query_row(&sql, [teacher_id], map_teacher)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("teacher"))
}

fn additional_classes(conn: &Connection, teacher_id: &str) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name
         FROM teacher_classes tc
         JOIN sclasses c ON c.id = tc.class_id
         WHERE tc.teacher_id = ?
         ORDER BY c.name",
    )?;
    let rows = stmt
        .query_map([teacher_id], |r| {
            Ok(json!({ "id": r.get::<_, String>(0)?, "name": r.get::<_, String>(1)? }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn teacher_json(conn: &Connection, t: &TeacherRow) -> Result<serde_json::Value, HandlerErr> {
    let subject = match (&t.subject_id, &t.subject_name) {
        (Some(id), Some(name)) => json!({
            "id": id,
            "subName": name,
            "sessions": t.subject_sessions.unwrap_or(0),
        }),
        _ => serde_json::Value::Null,
    };
    Ok(json!({
        "id": t.id,
        "name": t.name,
        "email": t.email,
        "role": "Teacher",
        "schoolId": t.school_id,
        "teachSclass": { "id": t.class_id, "name": t.class_name },
        "teachSubject": subject,
        "additionalClasses": additional_classes(conn, &t.id)?,
    }))
}

fn teacher_register(state: &mut AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let name = get_required_str(params, "name")?;
    let email = get_required_str(params, "email")?.to_lowercase();
    let password = get_required_str(params, "password")?;
    let class_id = get_required_str(params, "teachSclass")?;
    let subject_id = get_optional_str(params, "teachSubject")?;
    require_class_in_school(&state.db, session, &class_id)?;

    let taken: Option<i64> = state
        .db
        .query_row("SELECT 1 FROM teachers WHERE email = ?", [&email], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr::conflict("Email already exists"));
    }

    if let Some(subject_id) = subject_id.as_deref() {
        let subject = require_subject(&state.db, subject_id)?;
        if subject.class_id != class_id {
            return Err(HandlerErr::bad_params("subject does not belong to teachSclass")
                .with_details(json!({ "teachSubject": subject_id, "teachSclass": class_id })));
        }
        if subject.teacher_id.is_some() {
            return Err(HandlerErr::conflict("Subject already has a teacher"));
        }
    }

    let hash = auth::hash_password(&password, state.policy.bcrypt_cost)?;
    let teacher_id = Uuid::new_v4().to_string();
    let tx = state.db.transaction()?;
    tx.execute(
        "INSERT INTO teachers(id, school_id, name, email, password_hash, class_id, subject_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &teacher_id,
            &session.school_id,
            &name,
            &email,
            &hash,
            &class_id,
            &subject_id,
            now_rfc3339(),
        ),
    )?;
    if let Some(subject_id) = subject_id.as_deref() {
        tx.execute(
            "UPDATE subjects SET teacher_id = ? WHERE id = ?",
            (&teacher_id, subject_id),
        )?;
    }
    tx.commit()?;
    tracing::info!(teacher_id = %teacher_id, class_id = %class_id, "teacher registered");

    let row = load_teacher(&state.db, &teacher_id)?;
    teacher_json(&state.db, &row)
}

fn teacher_list(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let school_id = get_required_str(params, "id")?;
    require_school(session, &school_id)?;

    let sql = format!("{} WHERE t.school_id = ? ORDER BY t.name", TEACHER_SELECT);
    let mut stmt = state.db.prepare(&sql)?;
    let rows = stmt
        .query_map([&school_id], map_teacher)?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(rows.len());
    for t in &rows {
        out.push(teacher_json(&state.db, t)?);
    }
    Ok(list_or_message(out, "teachers"))
}

fn teacher_get(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "id")?;
    if !session.is(Role::Admin) && !session.is_self(Role::Teacher, &teacher_id) {
        return Err(HandlerErr::forbidden());
    }
    let row = load_teacher(&state.db, &teacher_id)?;
    require_school(session, &row.school_id)?;
    teacher_json(&state.db, &row)
}

/// Reassigns a teacher's subject; the previous holder of the subject loses it.
fn teacher_set_subject(state: &mut AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let teacher_id = get_required_str(params, "teacherId")?;
    let subject_id = get_required_str(params, "teachSubject")?;

    let teacher = load_teacher(&state.db, &teacher_id)?;
    require_school(session, &teacher.school_id)?;
    let subject = require_subject(&state.db, &subject_id)?;
    require_school(session, &subject.school_id)?;
    if subject.class_id != teacher.class_id {
        return Err(HandlerErr::bad_params("subject does not belong to teachSclass")
            .with_details(json!({ "teachSubject": subject_id, "teachSclass": teacher.class_id })));
    }

    let tx = state.db.transaction()?;
    if let Some(old_subject) = teacher.subject_id.as_deref() {
        tx.execute(
            "UPDATE subjects SET teacher_id = NULL WHERE id = ? AND teacher_id = ?",
            (old_subject, &teacher_id),
        )?;
    }
    if let Some(old_teacher) = subject.teacher_id.as_deref() {
        if old_teacher != teacher_id {
            tx.execute(
                "UPDATE teachers SET subject_id = NULL WHERE id = ?",
                [old_teacher],
            )?;
        }
    }
    tx.execute(
        "UPDATE teachers SET subject_id = ? WHERE id = ?",
        (&subject_id, &teacher_id),
    )?;
    tx.execute(
        "UPDATE subjects SET teacher_id = ? WHERE id = ?",
        (&teacher_id, &subject_id),
    )?;
    tx.commit()?;

    let row = load_teacher(&state.db, &teacher_id)?;
    teacher_json(&state.db, &row)
}

fn teacher_add_class(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Teacher])?;
    let class_id = get_required_str(params, "classId")?;
    require_class_in_school(&state.db, session, &class_id)?;

    let teacher = load_teacher(&state.db, &session.user_id)?;
    if teacher.class_id != class_id {
        state.db.execute(
            "INSERT OR IGNORE INTO teacher_classes(teacher_id, class_id) VALUES(?, ?)",
            (&teacher.id, &class_id),
        )?;
    }
    teacher_json(&state.db, &teacher)
}

fn teacher_remove_class(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Teacher])?;
    let class_id = get_required_str(params, "classId")?;

    let teacher = load_teacher(&state.db, &session.user_id)?;
    if teacher.class_id == class_id {
        return Err(HandlerErr::bad_params("cannot remove the primary class"));
    }
    let removed = state.db.execute(
        "DELETE FROM teacher_classes WHERE teacher_id = ? AND class_id = ?",
        (&teacher.id, &class_id),
    )?;
    if removed == 0 {
        return Err(HandlerErr::not_found("class assignment"));
    }
    teacher_json(&state.db, &teacher)
}

pub fn try_handle(state: &mut AppState, session: &Session, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teacher.register" => teacher_register(state, session, &req.params),
        "teacher.list" => teacher_list(state, session, &req.params),
        "teacher.get" => teacher_get(state, session, &req.params),
        "teacher.setSubject" => teacher_set_subject(state, session, &req.params),
        "teacher.addClass" => teacher_add_class(state, session, &req.params),
        "teacher.removeClass" => teacher_remove_class(state, session, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
