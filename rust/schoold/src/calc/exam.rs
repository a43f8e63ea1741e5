use super::{round_2_decimals, CalcError};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const ASSIGNMENT_WEIGHT: f64 = 0.10;
pub const ATTENDANCE_WEIGHT: f64 = 0.10;
pub const MID_EXAM_WEIGHT: f64 = 0.20;
pub const FINAL_EXAM_WEIGHT: f64 = 0.60;

pub const DEFAULT_PASS_THRESHOLD: f64 = 50.0;

/// Each component is a percentage within its own category (0..=100),
/// not pre-scaled by its weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMarks {
    pub assignment: f64,
    pub attendance: f64,
    pub mid_exam: f64,
    pub final_exam: f64,
}

impl ComponentMarks {
    fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("assignment", self.assignment),
            ("attendance", self.attendance),
            ("midExam", self.mid_exam),
            ("finalExam", self.final_exam),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassFail {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<ComponentMarks>,
    pub marks_obtained: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksSummary {
    pub subject_count: usize,
    pub total: f64,
    pub average: f64,
    pub highest: f64,
    pub lowest: f64,
    pub passed_count: usize,
    pub pass_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMarks {
    pub student_id: String,
    pub name: String,
    pub roll_num: i64,
    pub results: Vec<ExamResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopScorer {
    pub student_id: String,
    pub name: String,
    pub roll_num: i64,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolPerformance {
    pub student_count: usize,
    pub highest_scorer: Option<TopScorer>,
    pub passed_count: usize,
    pub failed_count: usize,
    pub pass_percentage: f64,
}

/// Rejects a mark outside 0..=100 or one that is not finite.
pub fn validate_mark(field: &str, value: f64) -> Result<f64, CalcError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(
            CalcError::new("validation_failed", format!("{} must be between 0 and 100", field))
                .with_details(json!({ "field": field, "value": value.to_string() })),
        );
    }
    Ok(value)
}

pub fn weighted_total(components: &ComponentMarks) -> Result<f64, CalcError> {
    for (field, value) in components.named() {
        validate_mark(field, value)?;
    }
    let total = components.assignment * ASSIGNMENT_WEIGHT
        + components.attendance * ATTENDANCE_WEIGHT
        + components.mid_exam * MID_EXAM_WEIGHT
        + components.final_exam * FINAL_EXAM_WEIGHT;
    Ok(round_2_decimals(total).clamp(0.0, 100.0))
}

pub fn pass_fail(total: f64, threshold: f64) -> PassFail {
    if total >= threshold {
        PassFail::Pass
    } else {
        PassFail::Fail
    }
}

/// Totals over results with a defined `marks_obtained`; the rest are skipped.
pub fn summary(results: &[ExamResult], threshold: f64) -> MarksSummary {
    let marks: Vec<f64> = results.iter().filter_map(|r| r.marks_obtained).collect();
    if marks.is_empty() {
        return MarksSummary::default();
    }

    let total: f64 = marks.iter().sum();
    let highest = marks.iter().copied().fold(f64::MIN, f64::max);
    let lowest = marks.iter().copied().fold(f64::MAX, f64::min);
    let passed_count = marks
        .iter()
        .filter(|m| pass_fail(**m, threshold) == PassFail::Pass)
        .count();
    let n = marks.len();

    MarksSummary {
        subject_count: n,
        total,
        average: total / n as f64,
        highest,
        lowest,
        passed_count,
        pass_percentage: passed_count as f64 / n as f64 * 100.0,
    }
}

/// Dashboard metric: each student with results is judged on the mean of all
/// of their results (an undefined mark counts as 0). The pass percentage is
/// taken over every student, with or without results.
pub fn school_performance(students: &[StudentMarks], threshold: f64) -> SchoolPerformance {
    let mut perf = SchoolPerformance {
        student_count: students.len(),
        ..SchoolPerformance::default()
    };
    if students.is_empty() {
        return perf;
    }

    let mut best: Option<TopScorer> = None;
    for s in students {
        if s.results.is_empty() {
            continue;
        }
        let sum: f64 = s.results.iter().map(|r| r.marks_obtained.unwrap_or(0.0)).sum();
        let avg = sum / s.results.len() as f64;

        // First student wins ties.
        if best.as_ref().map(|b| avg > b.score).unwrap_or(true) {
            best = Some(TopScorer {
                student_id: s.student_id.clone(),
                name: s.name.clone(),
                roll_num: s.roll_num,
                score: avg,
            });
        }
        match pass_fail(avg, threshold) {
            PassFail::Pass => perf.passed_count += 1,
            PassFail::Fail => perf.failed_count += 1,
        }
    }

    perf.highest_scorer = best;
    perf.pass_percentage = perf.passed_count as f64 / students.len() as f64 * 100.0;
    perf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(subject: &str, marks: Option<f64>) -> ExamResult {
        ExamResult {
            subject_id: subject.to_string(),
            subject_name: None,
            components: None,
            marks_obtained: marks,
        }
    }

    fn student(id: &str, marks: &[Option<f64>]) -> StudentMarks {
        StudentMarks {
            student_id: id.to_string(),
            name: format!("Student {}", id),
            roll_num: 1,
            results: marks
                .iter()
                .enumerate()
                .map(|(i, m)| result(&format!("s{}", i), *m))
                .collect(),
        }
    }

    #[test]
    fn weighted_total_applies_fixed_weights() {
        let c = ComponentMarks {
            assignment: 80.0,
            attendance: 90.0,
            mid_exam: 70.0,
            final_exam: 60.0,
        };
        assert_eq!(weighted_total(&c).expect("valid"), 67.0);
    }

    #[test]
    fn weighted_total_full_marks_is_100() {
        let c = ComponentMarks {
            assignment: 100.0,
            attendance: 100.0,
            mid_exam: 100.0,
            final_exam: 100.0,
        };
        assert_eq!(weighted_total(&c).expect("valid"), 100.0);
    }

    #[test]
    fn weighted_total_rejects_out_of_range_component() {
        let c = ComponentMarks {
            assignment: 80.0,
            attendance: 90.0,
            mid_exam: 120.0,
            final_exam: 60.0,
        };
        let e = weighted_total(&c).expect_err("should reject");
        assert_eq!(e.code, "validation_failed");
        assert_eq!(e.details.as_ref().and_then(|d| d.get("field")).and_then(|v| v.as_str()), Some("midExam"));

        let nan = ComponentMarks {
            assignment: f64::NAN,
            ..c
        };
        assert!(weighted_total(&nan).is_err());
        let neg = ComponentMarks {
            final_exam: -1.0,
            mid_exam: 10.0,
            ..c
        };
        assert!(weighted_total(&neg).is_err());
    }

    #[test]
    fn pass_fail_is_inclusive_at_threshold() {
        assert_eq!(pass_fail(50.0, 50.0), PassFail::Pass);
        assert_eq!(pass_fail(49.99, 50.0), PassFail::Fail);
        assert_eq!(pass_fail(40.0, 40.0), PassFail::Pass);
    }

    #[test]
    fn summary_of_nothing_is_all_zero() {
        assert_eq!(summary(&[], 50.0), MarksSummary::default());
        assert_eq!(summary(&[result("a", None)], 50.0), MarksSummary::default());
    }

    #[test]
    fn summary_pass_percentage_half() {
        let s = summary(&[result("a", Some(30.0)), result("b", Some(70.0))], 50.0);
        assert_eq!(s.subject_count, 2);
        assert_eq!(s.total, 100.0);
        assert_eq!(s.average, 50.0);
        assert_eq!(s.highest, 70.0);
        assert_eq!(s.lowest, 30.0);
        assert_eq!(s.passed_count, 1);
        assert_eq!(s.pass_percentage, 50.0);
    }

    #[test]
    fn summary_skips_undefined_marks() {
        let s = summary(
            &[result("a", Some(90.0)), result("b", None), result("c", Some(45.0))],
            40.0,
        );
        assert_eq!(s.subject_count, 2);
        assert_eq!(s.passed_count, 2);
        assert_eq!(s.pass_percentage, 100.0);
    }

    #[test]
    fn school_performance_counts_students_without_results_in_denominator() {
        let students = vec![
            student("a", &[Some(80.0), Some(60.0)]),
            student("b", &[Some(20.0), None]),
            student("c", &[]),
            student("d", &[Some(70.0)]),
        ];
        let p = school_performance(&students, 50.0);
        assert_eq!(p.student_count, 4);
        assert_eq!(p.passed_count, 2);
        assert_eq!(p.failed_count, 1);
        assert_eq!(p.pass_percentage, 50.0);
        let top = p.highest_scorer.expect("top scorer");
        // a and d tie at 70; the first one seen keeps the spot.
        assert_eq!(top.student_id, "a");
        assert_eq!(top.score, 70.0);
    }

    #[test]
    fn school_performance_empty_is_zeroed() {
        let p = school_performance(&[], 50.0);
        assert_eq!(p, SchoolPerformance::default());
    }
}
