use crate::auth::{self, Role, Session};
use crate::db::now_rfc3339;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_optional_i64, get_optional_str, get_required_i64, get_required_str, list_or_message,
    require_class_in_school, require_role, require_school,
};
use crate::ipc::records::{
    list_students_for_school, load_attendance, load_exam_results, require_student, StudentRow,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn roll_taken(
    conn: &Connection,
    class_id: &str,
    roll_num: i64,
    except_id: Option<&str>,
) -> Result<bool, HandlerErr> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE class_id = ? AND roll_num = ? AND id <> ?",
            (class_id, roll_num, except_id.unwrap_or("")),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

fn check_roll(roll_num: i64) -> Result<i64, HandlerErr> {
    if roll_num <= 0 {
        return Err(HandlerErr::bad_params("rollNum must be positive")
            .with_details(json!({ "rollNum": roll_num })));
    }
    Ok(roll_num)
}

/// Students may read their own record; staff may read any in their school.
pub(crate) fn student_for_reader(
    conn: &Connection,
    session: &Session,
    student_id: &str,
) -> Result<StudentRow, HandlerErr> {
    if session.is(Role::Student) && session.user_id != student_id {
        return Err(HandlerErr::forbidden());
    }
    let student = require_student(conn, student_id)?;
    require_school(session, &student.school_id)?;
    Ok(student)
}

fn student_register(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let name = get_required_str(params, "name")?;
    let roll_num = check_roll(get_required_i64(params, "rollNum")?)?;
    let password = get_required_str(params, "password")?;
    let class_id = get_required_str(params, "sclassName")?;
    require_class_in_school(&state.db, session, &class_id)?;

    if roll_taken(&state.db, &class_id, roll_num, None)? {
        return Err(HandlerErr::conflict("Roll Number already exists")
            .with_details(json!({ "rollNum": roll_num })));
    }

    let hash = auth::hash_password(&password, state.policy.bcrypt_cost)?;
    let student_id = Uuid::new_v4().to_string();
    state.db.execute(
        "INSERT INTO students(id, school_id, class_id, name, roll_num, password_hash, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &session.school_id,
            &class_id,
            &name,
            roll_num,
            &hash,
            now_rfc3339(),
        ),
    )?;
    tracing::info!(student_id = %student_id, class_id = %class_id, roll_num, "student registered");

    Ok(require_student(&state.db, &student_id)?.to_json())
}

fn student_list(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin, Role::Teacher])?;
    let school_id = get_required_str(params, "id")?;
    require_school(session, &school_id)?;
    let students = list_students_for_school(&state.db, &school_id)?
        .iter()
        .map(StudentRow::to_json)
        .collect();
    Ok(list_or_message(students, "students"))
}

fn student_get(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "id")?;
    let student = student_for_reader(&state.db, session, &student_id)?;

    let mut out = student.to_json();
    out["attendance"] = json!(load_attendance(&state.db, &student.id)?);
    out["examResult"] = json!(load_exam_results(&state.db, &student.id)?);
    Ok(out)
}

fn student_update(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin])?;
    let student_id = get_required_str(params, "id")?;
    let student = require_student(&state.db, &student_id)?;
    require_school(session, &student.school_id)?;

    let mut set_parts: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(name) = get_optional_str(params, "name")? {
        set_parts.push("name = ?");
        bind_values.push(Value::Text(name));
    }
    if let Some(roll_num) = get_optional_i64(params, "rollNum")? {
        let roll_num = check_roll(roll_num)?;
        if roll_taken(&state.db, &student.class_id, roll_num, Some(&student.id))? {
            return Err(HandlerErr::conflict("Roll Number already exists")
                .with_details(json!({ "rollNum": roll_num })));
        }
        set_parts.push("roll_num = ?");
        bind_values.push(Value::Integer(roll_num));
    }
    if let Some(password) = get_optional_str(params, "password")? {
        set_parts.push("password_hash = ?");
        bind_values.push(Value::Text(auth::hash_password(
            &password,
            state.policy.bcrypt_cost,
        )?));
    }

    if !set_parts.is_empty() {
        set_parts.push("updated_at = ?");
        bind_values.push(Value::Text(now_rfc3339()));
        bind_values.push(Value::Text(student.id.clone()));
        let sql = format!("UPDATE students SET {} WHERE id = ?", set_parts.join(", "));
        state.db.execute(&sql, params_from_iter(bind_values))?;
    }
    Ok(require_student(&state.db, &student.id)?.to_json())
}

pub fn try_handle(state: &mut AppState, session: &Session, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "student.register" => student_register(state, session, &req.params),
        "student.list" => student_list(state, session, &req.params),
        "student.get" => student_get(state, session, &req.params),
        "student.update" => student_update(state, session, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
