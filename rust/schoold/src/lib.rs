pub mod auth;
pub mod bootstrap;
pub mod calc;
pub mod config;
pub mod db;
pub mod http;
pub mod ipc;
pub mod logging;
