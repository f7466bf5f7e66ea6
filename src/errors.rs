//! Error types shared across the supervisor.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Session creation vetoed by the resource governor.
    Admission(String),
    /// Requested session does not exist.
    NotFound(String),
    /// Agent process failed to spawn.
    Launch(String),
    /// Resume attempt failed (spawn error or unwritable input channel).
    Resume(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Admission(msg) => write!(f, "admission denied: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::Resume(msg) => write!(f, "resume: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
