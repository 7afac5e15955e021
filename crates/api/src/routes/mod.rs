//! REST Routes

pub mod alerts;
pub mod messages;
pub mod monitor;
pub mod profile;
