use crate::auth::{Role, Session};
use crate::db::now_rfc3339;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, list_or_message, parse_date, require_role, require_school,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn notice_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "schoolId": r.get::<_, String>(1)?,
        "title": r.get::<_, String>(2)?,
        "details": r.get::<_, String>(3)?,
        "date": r.get::<_, String>(4)?,
    }))
}

fn load_notice(conn: &Connection, notice_id: &str) -> Result<(String, serde_json::Value), HandlerErr> {
    conn.query_row(
        "SELECT id, school_id, title, details, date FROM notices WHERE id = ?",
        [notice_id],
        |r| Ok((r.get::<_, String>(1)?, notice_row(r)?)),
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("notice"))
}

fn notice_create(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let title = get_required_str(params, "title")?;
    let details = get_required_str(params, "details")?;
    let date = parse_date(&get_required_str(params, "date")?)?;

    let notice_id = Uuid::new_v4().to_string();
    state.db.execute(
        "INSERT INTO notices(id, school_id, title, details, date, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &notice_id,
            &session.school_id,
            &title,
            &details,
            date.format("%Y-%m-%d").to_string(),
            now_rfc3339(),
        ),
    )?;
    Ok(load_notice(&state.db, &notice_id)?.1)
}

fn notice_list(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_id = get_required_str(params, "id")?;
    require_school(session, &school_id)?;
    let mut stmt = state.db.prepare(
        "SELECT id, school_id, title, details, date
         FROM notices
         WHERE school_id = ?
         ORDER BY date DESC, created_at DESC",
    )?;
    let rows = stmt
        .query_map([&school_id], notice_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(list_or_message(rows, "notices"))
}

fn notice_update(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let notice_id = get_required_str(params, "id")?;
    let (school_id, _) = load_notice(&state.db, &notice_id)?;
    require_school(session, &school_id)?;

    let mut set_parts: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();
    if let Some(title) = get_optional_str(params, "title")? {
        set_parts.push("title = ?");
        bind_values.push(Value::Text(title));
    }
    if let Some(details) = get_optional_str(params, "details")? {
        set_parts.push("details = ?");
        bind_values.push(Value::Text(details));
    }
    if let Some(date) = get_optional_str(params, "date")? {
        set_parts.push("date = ?");
        bind_values.push(Value::Text(parse_date(&date)?.format("%Y-%m-%d").to_string()));
    }

    if !set_parts.is_empty() {
        bind_values.push(Value::Text(notice_id.clone()));
        let sql = format!("UPDATE notices SET {} WHERE id = ?", set_parts.join(", "));
        state.db.execute(&sql, params_from_iter(bind_values))?;
    }
    Ok(load_notice(&state.db, &notice_id)?.1)
}

pub fn try_handle(state: &mut AppState, session: &Session, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "notice.create" => notice_create(state, session, &req.params),
        "notice.list" => notice_list(state, session, &req.params),
        "notice.update" => notice_update(state, session, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
