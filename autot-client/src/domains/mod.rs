pub mod auth;
pub mod progress;
