mod error;
mod handlers;
mod helpers;
mod records;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Policy, Request};
