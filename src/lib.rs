#![forbid(unsafe_code)]

//! `gosling` — supervisor for long-lived interactive agent sessions.
//!
//! Launches agent CLI processes, tracks their lifecycle, enforces
//! circuit-breaker ceilings, classifies real-time activity, resumes
//! exited sessions by name, and serves accumulated output in bounded
//! line windows. All state is in-memory and scoped to one supervisor
//! process.

pub mod config;
pub mod errors;
pub mod models;
pub mod registry;
pub mod supervisor;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
pub use supervisor::Supervisor;
