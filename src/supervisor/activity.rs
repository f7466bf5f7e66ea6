//! WORKING/IDLE classification from output recency.
//!
//! Recomputed on demand against the wall clock at inspection time —
//! never cached. This is a UX signal, configured independently of the
//! idle reaper's safety ceiling.

use serde::Serialize;
use tokio::time::Instant;

use crate::models::session::Session;

/// Default recency threshold for the WORKING classification.
pub const DEFAULT_IDLE_THRESHOLD_MS: u64 = 2_000;

/// Point-in-time activity classification for a session.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Activity {
    /// Output was produced within the threshold.
    Working,
    /// No recent output, or the session is not running.
    Idle {
        /// How long the session has been silent; absent for sessions
        /// that are not running.
        #[serde(skip_serializing_if = "Option::is_none")]
        idle_ms: Option<u64>,
    },
}

/// Classify a session's activity as observed at `now`.
#[must_use]
pub fn classify(session: &Session, idle_threshold_ms: u64, now: Instant) -> Activity {
    if !session.is_running() {
        return Activity::Idle { idle_ms: None };
    }
    let idle = session.idle_elapsed(now);
    let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
    if idle_ms < idle_threshold_ms {
        Activity::Working
    } else {
        Activity::Idle {
            idle_ms: Some(idle_ms),
        }
    }
}
