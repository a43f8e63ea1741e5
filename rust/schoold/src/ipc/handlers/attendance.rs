use crate::auth::{Role, Session};
use crate::calc::attendance::{attendance_report, AttendanceStatus};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::student::student_for_reader;
use crate::ipc::helpers::{get_required_str, parse_date, require_role, require_school};
use crate::ipc::records::{load_attendance, require_student, require_subject, StudentRow};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn staff_student(conn: &Connection, session: &Session, student_id: &str) -> Result<StudentRow, HandlerErr> {
    require_role(session, &[Role::Admin, Role::Teacher])?;
    let student = require_student(conn, student_id)?;
    require_school(session, &student.school_id)?;
    Ok(student)
}

fn report_json(conn: &Connection, student: &StudentRow) -> Result<serde_json::Value, HandlerErr> {
    let records = load_attendance(conn, &student.id)?;
    let mut out = json!(attendance_report(&records));
    out["studentId"] = json!(student.id);
    Ok(out)
}

/// Marks one student present or absent for one subject on one date.
///
/// A second write for the same date replaces the status. A new date is
/// refused once the subject's session count is used up.
fn attendance_record(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let date = parse_date(&get_required_str(params, "date")?)?;
    let raw_status = get_required_str(params, "status")?;
    let Some(status) = AttendanceStatus::parse(&raw_status) else {
        return Err(HandlerErr::bad_params("status must be Present or Absent")
            .with_details(json!({ "status": raw_status })));
    };

    let conn = &state.db;
    let student = staff_student(conn, session, &student_id)?;
    let subject = require_subject(conn, &subject_id)?;
    if subject.class_id != student.class_id {
        return Err(HandlerErr::bad_params("subject is not taught in the student's class")
            .with_details(json!({ "studentId": student.id, "subjectId": subject.id })));
    }
    let date_key = date.format("%Y-%m-%d").to_string();

    let existing: Option<i64> = conn
        .query_row(
            "SELECT seq FROM attendance WHERE student_id = ? AND subject_id = ? AND date = ?",
            (&student.id, &subject.id, &date_key),
            |r| r.get(0),
        )
        .optional()?;

    let updated = match existing {
        Some(seq) => {
            conn.execute(
                "UPDATE attendance SET status = ? WHERE seq = ?",
                (status.as_str(), seq),
            )?;
            true
        }
        None => {
            let used: i64 = conn.query_row(
                "SELECT COUNT(*) FROM attendance WHERE student_id = ? AND subject_id = ?",
                (&student.id, &subject.id),
                |r| r.get(0),
            )?;
            if used >= subject.sessions {
                return Err(HandlerErr::new(
                    "attendance_limit_reached",
                    "Maximum attendance limit reached",
                )
                .with_details(json!({ "sessions": subject.sessions, "recorded": used })));
            }
            conn.execute(
                "INSERT INTO attendance(student_id, subject_id, date, status) VALUES(?, ?, ?, ?)",
                (&student.id, &subject.id, &date_key, status.as_str()),
            )?;
            false
        }
    };
    tracing::debug!(
        student_id = %student.id,
        subject_id = %subject.id,
        date = %date_key,
        status = status.as_str(),
        updated,
        "attendance recorded"
    );

    let mut out = report_json(conn, &student)?;
    out["updated"] = json!(updated);
    Ok(out)
}

/// Drops every attendance entry one student has for one subject.
fn attendance_clear_subject(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "id")?;
    let subject_id = get_required_str(params, "subId")?;
    let student = staff_student(&state.db, session, &student_id)?;

    let removed = state.db.execute(
        "DELETE FROM attendance WHERE student_id = ? AND subject_id = ?",
        (&student.id, &subject_id),
    )?;
    tracing::info!(student_id = %student.id, subject_id = %subject_id, removed, "attendance cleared");
    Ok(json!({ "studentId": student.id, "subjectId": subject_id, "removed": removed }))
}

fn attendance_report_for(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "id")?;
    let student = student_for_reader(&state.db, session, &student_id)?;
    report_json(&state.db, &student)
}

pub fn try_handle(state: &mut AppState, session: &Session, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.record" => attendance_record(state, session, &req.params),
        "attendance.clearSubject" => attendance_clear_subject(state, session, &req.params),
        "attendance.report" => attendance_report_for(state, session, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
