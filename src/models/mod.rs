//! Domain models for supervised agent sessions.

pub mod output;
pub mod session;
