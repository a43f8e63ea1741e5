pub mod admin;
pub mod attendance;
pub mod complain;
pub mod core;
pub mod exam;
pub mod notice;
pub mod sclass;
pub mod student;
pub mod subject;
pub mod teacher;
