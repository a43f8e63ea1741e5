use crate::auth::{Role, Session};
use crate::calc::attendance::{subject_percentage, AttendanceStatus};
use crate::db::now_rfc3339;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_optional_i64, get_optional_str, get_required_i64, get_required_str, list_or_message,
    require_class_in_school, require_role, require_school,
};
use crate::ipc::records::{list_students_for_class, list_subjects, require_subject, SubjectRow};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn check_sessions(raw: i64) -> Result<i64, HandlerErr> {
    if raw < 0 {
        return Err(HandlerErr::bad_params("sessions must be >= 0")
            .with_details(json!({ "sessions": raw })));
    }
    Ok(raw)
}

/// Most attendance entries any one student holds for the subject.
fn max_recorded_sessions(conn: &Connection, subject_id: &str) -> Result<i64, HandlerErr> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(cnt) FROM (
             SELECT COUNT(*) AS cnt FROM attendance WHERE subject_id = ? GROUP BY student_id
         )",
        [subject_id],
        |r| r.get(0),
    )?;
    Ok(max.unwrap_or(0))
}

fn code_taken(
    conn: &Connection,
    class_id: &str,
    code: &str,
    except_id: Option<&str>,
) -> Result<bool, HandlerErr> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subjects WHERE class_id = ? AND code = ? AND id <> ?",
            (class_id, code, except_id.unwrap_or("")),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

/// Loads a subject and checks it belongs to the caller's school.
fn subject_in_school(conn: &Connection, session: &Session, subject_id: &str) -> Result<SubjectRow, HandlerErr> {
    let subject = require_subject(conn, subject_id)?;
    require_school(session, &subject.school_id)?;
    Ok(subject)
}

struct NewSubject {
    name: String,
    code: String,
    sessions: i64,
}

fn subject_create(state: &mut AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let class_id = get_required_str(params, "sclassName")?;
    require_class_in_school(&state.db, session, &class_id)?;

    let Some(items) = params.get("subjects").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing subjects"));
    };
    if items.is_empty() {
        return Err(HandlerErr::bad_params("subjects must not be empty"));
    }

    let mut parsed: Vec<NewSubject> = Vec::with_capacity(items.len());
    for item in items {
        let code = get_required_str(item, "subCode")?;
        if parsed.iter().any(|p| p.code == code) {
            return Err(HandlerErr::conflict("Sorry this subcode must be unique as it already exists")
                .with_details(json!({ "subCode": code })));
        }
        parsed.push(NewSubject {
            name: get_required_str(item, "subName")?,
            code,
            sessions: check_sessions(get_required_i64(item, "sessions")?)?,
        });
    }

    for p in &parsed {
        if code_taken(&state.db, &class_id, &p.code, None)? {
            return Err(HandlerErr::conflict("Sorry this subcode must be unique as it already exists")
                .with_details(json!({ "subCode": p.code })));
        }
    }

    let now = now_rfc3339();
    let mut ids = Vec::with_capacity(parsed.len());
    let tx = state.db.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO subjects(id, school_id, class_id, name, code, sessions, teacher_id, created_at)
             VALUES(?, ?, ?, ?, ?, ?, NULL, ?)",
        )?;
        for p in &parsed {
            let id = Uuid::new_v4().to_string();
            stmt.execute((&id, &session.school_id, &class_id, &p.name, &p.code, p.sessions, &now))?;
            ids.push(id);
        }
    }
    tx.commit()?;
    tracing::info!(class_id = %class_id, count = ids.len(), "subjects created");

    let created: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| require_subject(&state.db, id).map(|s| s.to_json()))
        .collect::<Result<_, _>>()?;
    Ok(serde_json::Value::Array(created))
}

fn subject_list_by_school(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_id = get_required_str(params, "id")?;
    require_school(session, &school_id)?;
    let rows = list_subjects(&state.db, "WHERE sub.school_id = ?", &school_id)?;
    Ok(list_or_message(rows.iter().map(SubjectRow::to_json).collect(), "subjects"))
}

fn subject_list_by_class(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "id")?;
    require_class_in_school(&state.db, session, &class_id)?;
    let rows = list_subjects(&state.db, "WHERE sub.class_id = ?", &class_id)?;
    Ok(list_or_message(rows.iter().map(SubjectRow::to_json).collect(), "subjects"))
}

fn subject_list_free(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let class_id = get_required_str(params, "id")?;
    require_class_in_school(&state.db, session, &class_id)?;
    let rows = list_subjects(
        &state.db,
        "WHERE sub.class_id = ? AND sub.teacher_id IS NULL",
        &class_id,
    )?;
    Ok(list_or_message(rows.iter().map(SubjectRow::to_json).collect(), "subjects"))
}

fn subject_get(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = get_required_str(params, "id")?;
    Ok(subject_in_school(&state.db, session, &subject_id)?.to_json())
}

fn subject_update(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let subject_id = get_required_str(params, "id")?;
    let subject = subject_in_school(&state.db, session, &subject_id)?;

    let mut set_parts: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(name) = get_optional_str(params, "subName")? {
        set_parts.push("name = ?");
        bind_values.push(Value::Text(name));
    }
    if let Some(code) = get_optional_str(params, "subCode")? {
        if code_taken(&state.db, &subject.class_id, &code, Some(&subject.id))? {
            return Err(HandlerErr::conflict("Sorry this subcode must be unique as it already exists")
                .with_details(json!({ "subCode": code })));
        }
        set_parts.push("code = ?");
        bind_values.push(Value::Text(code));
    }
    if let Some(sessions) = get_optional_i64(params, "sessions")? {
        let sessions = check_sessions(sessions)?;
        let recorded = max_recorded_sessions(&state.db, &subject.id)?;
        if sessions < recorded {
            return Err(HandlerErr::conflict("sessions is below attendance already recorded")
                .with_details(json!({ "sessions": sessions, "recorded": recorded })));
        }
        set_parts.push("sessions = ?");
        bind_values.push(Value::Integer(sessions));
    }

    if !set_parts.is_empty() {
        bind_values.push(Value::Text(subject.id.clone()));
        let sql = format!("UPDATE subjects SET {} WHERE id = ?", set_parts.join(", "));
        state.db.execute(&sql, params_from_iter(bind_values))?;
    }
    Ok(require_subject(&state.db, &subject.id)?.to_json())
}

/// Per-student attendance and marks for one subject, for the teacher view.
fn subject_roster(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin, Role::Teacher])?;
    let subject_id = get_required_str(params, "id")?;
    let subject = subject_in_school(&state.db, session, &subject_id)?;
    let sessions = subject.sessions.clamp(0, u32::MAX as i64) as u32;
    let conn = &state.db;

    let mut present_stmt = conn.prepare(
        "SELECT COUNT(*) FROM attendance WHERE student_id = ? AND subject_id = ? AND status = ?",
    )?;
    let mut marks_stmt = conn.prepare(
        "SELECT marks_obtained FROM exam_results WHERE student_id = ? AND subject_id = ?",
    )?;

    let mut rows = Vec::new();
    for s in list_students_for_class(conn, &subject.class_id)? {
        let present: i64 = present_stmt.query_row(
            (&s.id, &subject.id, AttendanceStatus::Present.as_str()),
            |r| r.get(0),
        )?;
        let present = present.clamp(0, u32::MAX as i64) as u32;
        let marks: Option<f64> = marks_stmt
            .query_row((&s.id, &subject.id), |r| r.get::<_, Option<f64>>(0))
            .optional()?
            .flatten();
        rows.push(json!({
            "student": s.to_json(),
            "present": present,
            "sessions": sessions,
            "percentage": subject_percentage(present, sessions),
            "marksObtained": marks,
        }));
    }

    Ok(json!({
        "subject": subject.to_json(),
        "students": rows,
    }))
}

pub fn try_handle(state: &mut AppState, session: &Session, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subject.create" => subject_create(state, session, &req.params),
        "subject.listBySchool" => subject_list_by_school(state, session, &req.params),
        "subject.listByClass" => subject_list_by_class(state, session, &req.params),
        "subject.listFree" => subject_list_free(state, session, &req.params),
        "subject.get" => subject_get(state, session, &req.params),
        "subject.update" => subject_update(state, session, &req.params),
        "subject.roster" => subject_roster(state, session, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
