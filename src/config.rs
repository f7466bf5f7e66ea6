//! Global configuration parsing and validation.

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

fn default_agent_bin() -> String {
    "goose".into()
}

fn default_true() -> bool {
    true
}

fn default_max_active_sessions() -> u32 {
    5
}

fn default_max_total_sessions() -> u32 {
    50
}

fn default_max_runtime_minutes() -> u64 {
    60
}

fn default_max_output_bytes() -> u64 {
    1_048_576
}

fn default_max_prompts_per_session() -> u32 {
    20
}

fn default_auto_terminate_idle_minutes() -> u64 {
    30
}

/// Circuit-breaker policy enforced by the resource governor.
///
/// Process-wide, not per-session. Mutable at runtime; a change applies to
/// future checks only and never retroactively invalidates a running session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BreakerConfig {
    /// Master switch for all ceilings and the idle reaper.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum sessions in `Running` status at once.
    #[serde(default = "default_max_active_sessions")]
    pub max_active_sessions: u32,
    /// Maximum sessions ever registered (running or terminal).
    #[serde(default = "default_max_total_sessions")]
    pub max_total_sessions: u32,
    /// Wall-clock ceiling per run segment before forced termination.
    #[serde(default = "default_max_runtime_minutes")]
    pub max_runtime_minutes: u64,
    /// Byte ceiling on a session's accumulated stdout.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: u64,
    /// Follow-up prompt budget per session (not reset on resume).
    #[serde(default = "default_max_prompts_per_session")]
    pub max_prompts_per_session: u32,
    /// Idle duration after which the reaper force-terminates a session.
    #[serde(default = "default_auto_terminate_idle_minutes")]
    pub auto_terminate_idle_minutes: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_active_sessions: default_max_active_sessions(),
            max_total_sessions: default_max_total_sessions(),
            max_runtime_minutes: default_max_runtime_minutes(),
            max_output_bytes: default_max_output_bytes(),
            max_prompts_per_session: default_max_prompts_per_session(),
            auto_terminate_idle_minutes: default_auto_terminate_idle_minutes(),
        }
    }
}

/// Partial circuit-breaker update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BreakerConfigPatch {
    /// New master-switch value, if any.
    pub enabled: Option<bool>,
    /// New active-session ceiling, if any.
    pub max_active_sessions: Option<u32>,
    /// New total-session ceiling, if any.
    pub max_total_sessions: Option<u32>,
    /// New runtime ceiling, if any.
    pub max_runtime_minutes: Option<u64>,
    /// New output-byte ceiling, if any.
    pub max_output_bytes: Option<u64>,
    /// New prompt budget, if any.
    pub max_prompts_per_session: Option<u32>,
    /// New idle-reap ceiling, if any.
    pub auto_terminate_idle_minutes: Option<u64>,
}

impl BreakerConfig {
    /// Apply a partial update, returning the merged config.
    #[must_use]
    pub fn apply(&self, patch: &BreakerConfigPatch) -> Self {
        Self {
            enabled: patch.enabled.unwrap_or(self.enabled),
            max_active_sessions: patch.max_active_sessions.unwrap_or(self.max_active_sessions),
            max_total_sessions: patch.max_total_sessions.unwrap_or(self.max_total_sessions),
            max_runtime_minutes: patch.max_runtime_minutes.unwrap_or(self.max_runtime_minutes),
            max_output_bytes: patch.max_output_bytes.unwrap_or(self.max_output_bytes),
            max_prompts_per_session: patch
                .max_prompts_per_session
                .unwrap_or(self.max_prompts_per_session),
            auto_terminate_idle_minutes: patch
                .auto_terminate_idle_minutes
                .unwrap_or(self.auto_terminate_idle_minutes),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Agent CLI binary (e.g. `goose`).
    #[serde(default = "default_agent_bin")]
    pub agent_bin: String,
    /// Extra arguments inserted after the `run` subcommand.
    #[serde(default)]
    pub agent_args: Vec<String>,
    /// Circuit-breaker policy.
    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            agent_bin: default_agent_bin(),
            agent_args: Vec::new(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the TOML is malformed or a field
    /// fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field constraints.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.agent_bin.trim().is_empty() {
            return Err(AppError::Config("agent_bin must not be empty".into()));
        }
        if self.breaker.max_active_sessions == 0 {
            return Err(AppError::Config(
                "breaker.max_active_sessions must be at least 1".into(),
            ));
        }
        if self.breaker.max_total_sessions < self.breaker.max_active_sessions {
            return Err(AppError::Config(
                "breaker.max_total_sessions must be >= breaker.max_active_sessions".into(),
            ));
        }
        if self.breaker.max_output_bytes == 0 {
            return Err(AppError::Config(
                "breaker.max_output_bytes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
