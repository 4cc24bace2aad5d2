pub mod announcement;
pub mod attendance;
pub mod course;
pub mod entry;
pub mod role;
pub mod settings;
pub mod user;
