use std::path::PathBuf;

use clap::Parser;

use crate::calc::exam::DEFAULT_PASS_THRESHOLD;
use crate::ipc::Policy;

#[derive(Debug, Parser, Clone)]
#[clap(name = "schoold", version, about = "School management backend")]
pub struct Config {
    #[clap(long, env, default_value = "0.0.0.0")]
    pub host: String,

    #[clap(long, env, default_value_t = 5000)]
    pub port: u16,

    /// Directory holding school.sqlite3.
    #[clap(long, env, default_value = "./data")]
    pub data_dir: PathBuf,

    #[clap(long, env, default_value = "info")]
    pub log_level: String,

    /// Minimum marks (inclusive) for a pass.
    #[clap(long, env, default_value_t = DEFAULT_PASS_THRESHOLD)]
    pub pass_threshold: f64,

    #[clap(long, env, default_value_t = 10)]
    pub bcrypt_cost: u32,

    /// Serve line-delimited JSON requests on stdin/stdout instead of HTTP.
    #[clap(long)]
    pub stdio: bool,

    #[clap(long, env, requires = "bootstrap_admin_password")]
    pub bootstrap_admin_email: Option<String>,

    #[clap(long, env, requires = "bootstrap_admin_email")]
    pub bootstrap_admin_password: Option<String>,

    #[clap(long, env, default_value = "Default School")]
    pub bootstrap_school_name: String,
}

impl Config {
    pub fn policy(&self) -> Policy {
        Policy {
            pass_threshold: self.pass_threshold,
            bcrypt_cost: self.bcrypt_cost,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
