use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use crate::auth::{Role, Session};
use crate::ipc::error::HandlerErr;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let s = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s)
}

/// `Ok(None)` when absent or null; an error when present with the wrong type.
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("{} must be a string", key)));
            };
            let t = s.trim();
            if t.is_empty() {
                return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
            }
            Ok(Some(t.to_string()))
        }
    }
}

/// Accepts JSON integers and integer-looking strings ("12"), as forms send both.
pub fn get_optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            if let Some(n) = v.as_i64() {
                return Ok(Some(n));
            }
            if let Some(n) = v.as_str().and_then(|s| s.trim().parse::<i64>().ok()) {
                return Ok(Some(n));
            }
            Err(HandlerErr::bad_params(format!("{} must be an integer", key)))
        }
    }
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    get_optional_i64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Marks must arrive as JSON numbers; strings are not coerced.
pub fn get_optional_number(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{} must be a number", key))
                .with_details(json!({ "field": key, "value": v }))
        }),
    }
}

/// `YYYY-MM-DD`, or an RFC 3339 timestamp truncated to its date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    let t = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(t) {
        return Ok(dt.date_naive());
    }
    Err(HandlerErr::bad_params("date must be YYYY-MM-DD"))
}

pub fn require_role(session: &Session, roles: &[Role]) -> Result<(), HandlerErr> {
    if roles.contains(&session.role) {
        Ok(())
    } else {
        Err(HandlerErr::forbidden())
    }
}

pub fn require_school(session: &Session, school_id: &str) -> Result<(), HandlerErr> {
    if session.school_id == school_id {
        Ok(())
    } else {
        Err(HandlerErr::forbidden())
    }
}

/// Empty lists are reported as `{ message }` rather than `[]`.
pub fn list_or_message(items: Vec<serde_json::Value>, what: &str) -> serde_json::Value {
    if items.is_empty() {
        json!({ "message": format!("No {} found", what) })
    } else {
        serde_json::Value::Array(items)
    }
}

pub fn class_school(conn: &Connection, class_id: &str) -> Result<Option<String>, HandlerErr> {
    Ok(conn
        .query_row(
            "SELECT school_id FROM sclasses WHERE id = ?",
            [class_id],
            |r| r.get::<_, String>(0),
        )
        .optional()?)
}

/// Fails with `not_found` for unknown classes and `forbidden` for another school's.
pub fn require_class_in_school(
    conn: &Connection,
    session: &Session,
    class_id: &str,
) -> Result<(), HandlerErr> {
    let Some(school_id) = class_school(conn, class_id)? else {
        return Err(HandlerErr::not_found("class"));
    };
    require_school(session, &school_id)
}
