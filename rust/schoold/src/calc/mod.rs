//! Pure aggregations over already-fetched student records.
//!
//! Nothing in here touches the database; handlers materialize records and
//! hand them over.

pub mod attendance;
pub mod exam;

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Half-away-from-zero rounding to two decimals, matching how marks are shown.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
