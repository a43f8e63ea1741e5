use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use crate::calc::attendance::{AttendanceRecord, AttendanceStatus};
use crate::calc::exam::{ComponentMarks, ExamResult};
use crate::ipc::error::HandlerErr;

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: String,
    pub school_id: String,
    pub class_id: String,
    pub class_name: String,
    pub name: String,
    pub roll_num: i64,
}

impl StudentRow {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "rollNum": self.roll_num,
            "role": "Student",
            "schoolId": self.school_id,
            "sclass": { "id": self.class_id, "name": self.class_name },
        })
    }
}

const STUDENT_SELECT: &str = "SELECT s.id, s.school_id, s.class_id, c.name, s.name, s.roll_num
     FROM students s
     JOIN sclasses c ON c.id = s.class_id";

fn map_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        school_id: r.get(1)?,
        class_id: r.get(2)?,
        class_name: r.get(3)?,
        name: r.get(4)?,
        roll_num: r.get(5)?,
    })
}

pub fn load_student(conn: &Connection, student_id: &str) -> Result<Option<StudentRow>, HandlerErr> {
    let sql = format!("{} WHERE s.id = ?", STUDENT_SELECT);
    Ok(conn.query_row(&sql, [student_id], map_student).optional()?)
}

pub fn require_student(conn: &Connection, student_id: &str) -> Result<StudentRow, HandlerErr> {
    load_student(conn, student_id)?.ok_or_else(|| HandlerErr::not_found("student"))
}

pub fn list_students_for_school(conn: &Connection, school_id: &str) -> Result<Vec<StudentRow>, HandlerErr> {
    let sql = format!("{} WHERE s.school_id = ? ORDER BY c.name, s.roll_num", STUDENT_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([school_id], map_student)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_students_for_class(conn: &Connection, class_id: &str) -> Result<Vec<StudentRow>, HandlerErr> {
    let sql = format!("{} WHERE s.class_id = ? ORDER BY s.roll_num", STUDENT_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([class_id], map_student)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct SubjectRow {
    pub id: String,
    pub school_id: String,
    pub class_id: String,
    pub class_name: String,
    pub name: String,
    pub code: String,
    pub sessions: i64,
    pub teacher_id: Option<String>,
    pub teacher_name: Option<String>,
}

impl SubjectRow {
    pub fn to_json(&self) -> serde_json::Value {
        let teacher = match (&self.teacher_id, &self.teacher_name) {
            (Some(id), Some(name)) => json!({ "id": id, "name": name }),
            _ => serde_json::Value::Null,
        };
        json!({
            "id": self.id,
            "subName": self.name,
            "subCode": self.code,
            "sessions": self.sessions,
            "schoolId": self.school_id,
            "sclass": { "id": self.class_id, "name": self.class_name },
            "teacher": teacher,
        })
    }
}

const SUBJECT_SELECT: &str = "SELECT sub.id, sub.school_id, sub.class_id, c.name, sub.name, sub.code,
            sub.sessions, sub.teacher_id, t.name
     FROM subjects sub
     JOIN sclasses c ON c.id = sub.class_id
     LEFT JOIN teachers t ON t.id = sub.teacher_id";

fn map_subject(r: &rusqlite::Row<'_>) -> rusqlite::Result<SubjectRow> {
    Ok(SubjectRow {
        id: r.get(0)?,
        school_id: r.get(1)?,
        class_id: r.get(2)?,
        class_name: r.get(3)?,
        name: r.get(4)?,
        code: r.get(5)?,
        sessions: r.get(6)?,
        teacher_id: r.get(7)?,
        teacher_name: r.get(8)?,
    })
}

pub fn load_subject(conn: &Connection, subject_id: &str) -> Result<Option<SubjectRow>, HandlerErr> {
    let sql = format!("{} WHERE sub.id = ?", SUBJECT_SELECT);
    Ok(conn.query_row(&sql, [subject_id], map_subject).optional()?)
}

pub fn require_subject(conn: &Connection, subject_id: &str) -> Result<SubjectRow, HandlerErr> {
    load_subject(conn, subject_id)?.ok_or_else(|| HandlerErr::not_found("subject"))
}

/// `filter` is a trailing `WHERE ...` clause with a single bound parameter.
pub fn list_subjects(conn: &Connection, filter: &str, arg: &str) -> Result<Vec<SubjectRow>, HandlerErr> {
    let sql = format!("{} {} ORDER BY c.name, sub.name", SUBJECT_SELECT, filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([arg], map_subject)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn sessions_u32(raw: i64) -> u32 {
    raw.clamp(0, u32::MAX as i64) as u32
}

/// Attendance entries for one student, joined with subject info, in recorded order.
pub fn load_attendance(conn: &Connection, student_id: &str) -> Result<Vec<AttendanceRecord>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT a.subject_id, sub.name, sub.code, sub.sessions, a.date, a.status
         FROM attendance a
         JOIN subjects sub ON sub.id = a.subject_id
         WHERE a.student_id = ?
         ORDER BY a.seq",
    )?;
    let raw = stmt
        .query_map([student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(raw.len());
    for (subject_id, subject_name, subject_code, sessions, date, status) in raw {
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
            HandlerErr::new("db_corrupt", format!("bad attendance date {}: {}", date, e))
        })?;
        let status = AttendanceStatus::parse(&status).ok_or_else(|| {
            HandlerErr::new("db_corrupt", format!("bad attendance status {}", status))
        })?;
        out.push(AttendanceRecord {
            subject_id,
            subject_name,
            subject_code,
            total_sessions: sessions_u32(sessions),
            date,
            status,
        });
    }
    Ok(out)
}

pub fn load_exam_results(conn: &Connection, student_id: &str) -> Result<Vec<ExamResult>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT e.subject_id, sub.name, e.assignment, e.attendance, e.mid_exam, e.final_exam,
                e.marks_obtained
         FROM exam_results e
         JOIN subjects sub ON sub.id = e.subject_id
         WHERE e.student_id = ?
         ORDER BY sub.name",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            let a: Option<f64> = r.get(2)?;
            let t: Option<f64> = r.get(3)?;
            let m: Option<f64> = r.get(4)?;
            let f: Option<f64> = r.get(5)?;
            let components = match (a, t, m, f) {
                (Some(assignment), Some(attendance), Some(mid_exam), Some(final_exam)) => {
                    Some(ComponentMarks {
                        assignment,
                        attendance,
                        mid_exam,
                        final_exam,
                    })
                }
                _ => None,
            };
            Ok(ExamResult {
                subject_id: r.get(0)?,
                subject_name: Some(r.get(1)?),
                components,
                marks_obtained: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
