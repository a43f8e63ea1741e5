use crate::auth::{Role, Session};
use crate::calc::exam::{pass_fail, summary, validate_mark, weighted_total, ComponentMarks};
use crate::db::now_rfc3339;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::student::student_for_reader;
use crate::ipc::helpers::{get_optional_number, get_required_str, require_role, require_school};
use crate::ipc::records::{load_exam_results, require_student, require_subject};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn required_mark(marks: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    get_optional_number(marks, key)?
        .ok_or_else(|| HandlerErr::bad_params(format!("missing marks.{}", key)))
}

fn parse_components(marks: &serde_json::Value) -> Result<ComponentMarks, HandlerErr> {
    if !marks.is_object() {
        return Err(HandlerErr::bad_params("marks must be an object"));
    }
    Ok(ComponentMarks {
        assignment: required_mark(marks, "assignment")?,
        attendance: required_mark(marks, "attendance")?,
        mid_exam: required_mark(marks, "midExam")?,
        final_exam: required_mark(marks, "finalExam")?,
    })
}

/// Stores one subject's marks for a student, replacing any earlier entry.
///
/// Either `marks` (four components, weighted) or a direct `marksObtained`
/// must be given. When both are, the components win.
fn exam_record(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_role(session, &[Role::Admin, Role::Teacher])?;
    let student_id = get_required_str(params, "studentId")?;
    let subject_id = get_required_str(params, "subjectId")?;

    let components = match params.get("marks") {
        None | Some(serde_json::Value::Null) => None,
        Some(m) => Some(parse_components(m)?),
    };
    let marks_obtained = match components {
        Some(c) => weighted_total(&c)?,
        None => {
            let Some(direct) = get_optional_number(params, "marksObtained")? else {
                return Err(HandlerErr::bad_params("missing marks or marksObtained"));
            };
            validate_mark("marksObtained", direct)?
        }
    };

    let conn = &state.db;
    let student = require_student(conn, &student_id)?;
    require_school(session, &student.school_id)?;
    let subject = require_subject(conn, &subject_id)?;
    if subject.class_id != student.class_id {
        return Err(HandlerErr::bad_params("subject is not taught in the student's class")
            .with_details(json!({ "studentId": student.id, "subjectId": subject.id })));
    }

    conn.execute(
        "INSERT INTO exam_results(student_id, subject_id, assignment, attendance, mid_exam,
                                  final_exam, marks_obtained, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, subject_id) DO UPDATE SET
           assignment = excluded.assignment,
           attendance = excluded.attendance,
           mid_exam = excluded.mid_exam,
           final_exam = excluded.final_exam,
           marks_obtained = excluded.marks_obtained,
           updated_at = excluded.updated_at",
        (
            &student.id,
            &subject.id,
            components.map(|c| c.assignment),
            components.map(|c| c.attendance),
            components.map(|c| c.mid_exam),
            components.map(|c| c.final_exam),
            marks_obtained,
            now_rfc3339(),
        ),
    )?;
    tracing::debug!(student_id = %student.id, subject_id = %subject.id, marks_obtained, "exam result stored");

    let threshold = state.policy.pass_threshold;
    Ok(json!({
        "studentId": student.id,
        "subjectId": subject.id,
        "subjectName": subject.name,
        "components": components,
        "marksObtained": marks_obtained,
        "result": pass_fail(marks_obtained, threshold),
        "passThreshold": threshold,
    }))
}

fn exam_summary(state: &AppState, session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "id")?;
    let student = student_for_reader(&state.db, session, &student_id)?;
    let threshold = state.policy.pass_threshold;

    let results = load_exam_results(&state.db, &student.id)?;
    let rows: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            let mut row = json!(r);
            row["result"] = json!(r.marks_obtained.map(|m| pass_fail(m, threshold)));
            row
        })
        .collect();

    Ok(json!({
        "studentId": student.id,
        "results": rows,
        "summary": summary(&results, threshold),
        "passThreshold": threshold,
    }))
}

pub fn try_handle(state: &mut AppState, session: &Session, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "exam.record" => exam_record(state, session, &req.params),
        "exam.summary" => exam_summary(state, session, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
