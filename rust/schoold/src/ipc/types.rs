use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::calc::exam::DEFAULT_PASS_THRESHOLD;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    pub pass_threshold: f64,
    pub bcrypt_cost: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

pub struct AppState {
    pub data_dir: Option<PathBuf>,
    pub db: Connection,
    pub policy: Policy,
}
