use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Present" | "present" => Some(Self::Present),
            "Absent" | "absent" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
        }
    }
}

/// One attendance entry joined with its subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub subject_id: String,
    pub subject_name: String,
    pub subject_code: String,
    pub total_sessions: u32,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAttendance {
    pub subject_id: String,
    pub subject_name: String,
    pub subject_code: String,
    pub present: u32,
    pub sessions: u32,
    pub records: Vec<AttendanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAttendanceRow {
    #[serde(flatten)]
    pub subject: SubjectAttendance,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReport {
    pub subjects: Vec<SubjectAttendanceRow>,
    pub total_present: u32,
    pub total_sessions: u32,
    pub overall_percentage: f64,
}

/// Groups records by subject id, in first-appearance order.
///
/// `sessions` is taken from the subject's configured total, never from the
/// number of records seen. Drill-down records keep their input order.
pub fn group_by_subject(records: &[AttendanceRecord]) -> Vec<SubjectAttendance> {
    let mut groups: Vec<SubjectAttendance> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for rec in records {
        let slot = match index.get(rec.subject_id.as_str()) {
            Some(&i) => i,
            None => {
                groups.push(SubjectAttendance {
                    subject_id: rec.subject_id.clone(),
                    subject_name: rec.subject_name.clone(),
                    subject_code: rec.subject_code.clone(),
                    present: 0,
                    sessions: rec.total_sessions,
                    records: Vec::new(),
                });
                index.insert(rec.subject_id.as_str(), groups.len() - 1);
                groups.len() - 1
            }
        };
        let group = &mut groups[slot];
        if rec.status == AttendanceStatus::Present {
            group.present += 1;
        }
        group.records.push(rec.clone());
    }

    groups
}

pub fn subject_percentage(present: u32, sessions: u32) -> u32 {
    if sessions == 0 {
        return 0;
    }
    ((present as f64 / sessions as f64) * 100.0).round() as u32
}

/// Present entries over the summed session counts of every distinct subject.
pub fn overall_percentage(records: &[AttendanceRecord]) -> f64 {
    let (present, sessions) = overall_counts(records);
    if sessions == 0 {
        return 0.0;
    }
    (present as f64 / sessions as f64 * 100.0).clamp(0.0, 100.0)
}

fn overall_counts(records: &[AttendanceRecord]) -> (u32, u32) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut sessions: u32 = 0;
    let mut present: u32 = 0;
    for rec in records {
        if seen.insert(rec.subject_id.as_str()) {
            sessions = sessions.saturating_add(rec.total_sessions);
        }
        if rec.status == AttendanceStatus::Present {
            present += 1;
        }
    }
    (present, sessions)
}

pub fn attendance_report(records: &[AttendanceRecord]) -> AttendanceReport {
    let (total_present, total_sessions) = overall_counts(records);
    let subjects = group_by_subject(records)
        .into_iter()
        .map(|subject| {
            let percentage = subject_percentage(subject.present, subject.sessions);
            SubjectAttendanceRow {
                subject,
                percentage,
            }
        })
        .collect();

    AttendanceReport {
        subjects,
        total_present,
        total_sessions,
        overall_percentage: overall_percentage(records),
    }
}
