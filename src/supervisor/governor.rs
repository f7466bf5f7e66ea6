//! Resource governor: admission control, per-session ceilings, and the
//! periodic idle reaper.
//!
//! The governor observes the registry and the output accumulator but
//! never originates session data itself — it only vetoes creation and
//! forces termination.

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BreakerConfig;
use crate::models::session::{Session, SessionStatus};
use crate::registry::{SessionRegistry, SharedSession};
use crate::supervisor::monitor::Children;
use crate::supervisor::SharedBreaker;
use crate::{AppError, Result};

/// Cadence of the idle-reaper scan.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Admission check run before any process is spawned.
///
/// # Errors
///
/// Returns `AppError::Admission` when the running-session or
/// total-session ceiling has been reached.
pub fn check_admission(running: usize, total: usize, cfg: &BreakerConfig) -> Result<()> {
    if running >= cfg.max_active_sessions as usize {
        return Err(AppError::Admission(format!(
            "active session limit reached ({running}/{})",
            cfg.max_active_sessions
        )));
    }
    if total >= cfg.max_total_sessions as usize {
        return Err(AppError::Admission(format!(
            "total session limit reached ({total}/{})",
            cfg.max_total_sessions
        )));
    }
    Ok(())
}

/// Whether a session has spent its follow-up prompt budget.
#[must_use]
pub fn prompt_budget_exhausted(prompt_count: u32, cfg: &BreakerConfig) -> bool {
    cfg.enabled && prompt_count >= cfg.max_prompts_per_session
}

/// Apply a stdout chunk under the output-byte ceiling.
///
/// When the chunk would push the accumulator past the ceiling it is
/// truncated to the remaining budget (backing off to the nearest UTF-8
/// boundary), the partial data is applied, and `true` is returned so the
/// caller force-terminates the session. Nothing beyond the ceiling is
/// ever kept.
pub(crate) fn admit_output(session: &mut Session, chunk: &str, cfg: &BreakerConfig) -> bool {
    if !cfg.enabled {
        session.note_output(chunk);
        return false;
    }
    let remaining = cfg
        .max_output_bytes
        .saturating_sub(session.output.size_bytes());
    let budget = usize::try_from(remaining).unwrap_or(usize::MAX);
    if chunk.len() <= budget {
        session.note_output(chunk);
        false
    } else {
        session.note_output(clamp_chunk(chunk, budget));
        true
    }
}

/// Longest prefix of `chunk` that fits `budget` bytes without splitting
/// a UTF-8 sequence.
fn clamp_chunk(chunk: &str, budget: usize) -> &str {
    let mut end = budget.min(chunk.len());
    while end > 0 && !chunk.is_char_boundary(end) {
        end -= 1;
    }
    &chunk[..end]
}

/// Force a session out of `Running`: mark it `Completed`, cancel its
/// runtime timer, and send the agent process a graceful kill signal.
///
/// Returns whether the session actually transitioned. When
/// `expected_epoch` is given and no longer matches (the session has been
/// resumed since the caller observed it), nothing happens.
pub(crate) async fn force_terminate(
    id: &str,
    session: &SharedSession,
    children: &Children,
    expected_epoch: Option<u64>,
    reason: &str,
) -> bool {
    let transitioned = {
        let mut record = session.lock().await;
        if expected_epoch.is_some_and(|epoch| record.run_epoch != epoch) {
            return false;
        }
        let was_running = record.is_running();
        if was_running {
            record.status = SessionStatus::Completed;
            record.ended_at = Some(Utc::now());
        }
        was_running
    };

    if let Some(handle) = children.lock().await.remove(id) {
        handle.run_cancel.cancel();
        if let Some(pid) = handle.pid {
            signal_terminate(pid);
        }
    }

    if transitioned {
        info!(session_id = %id, reason, "session force-terminated");
    }
    transitioned
}

/// Send `SIGTERM` to the agent process. The exit watcher observes the
/// resulting exit; its status transition is a no-op after the early
/// `Completed` mark.
#[cfg(unix)]
fn signal_terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match i32::try_from(pid) {
        Ok(raw) => {
            if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
                warn!(pid, %err, "failed to signal agent process");
            }
        }
        Err(_) => warn!(pid, "pid out of range for signal delivery"),
    }
}

#[cfg(not(unix))]
fn signal_terminate(_pid: u32) {}

/// One-shot runtime ceiling for a single run segment.
///
/// The duration is captured at spawn time; a later config change applies
/// only to segments started after it. Resuming a session schedules a
/// fresh timer, so elapsed time from earlier segments is not carried
/// over.
pub(crate) fn spawn_runtime_ceiling(
    id: String,
    epoch: u64,
    session: SharedSession,
    children: Children,
    limit: Duration,
    cancel: CancellationToken,
) {
    let _task = tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(limit) => {
                if force_terminate(&id, &session, &children, Some(epoch), "runtime ceiling").await {
                    warn!(session_id = %id, limit_secs = limit.as_secs(), "runtime ceiling fired");
                }
            }
        }
    });
}

/// Spawn the periodic idle reaper.
///
/// Scans all running sessions once per [`REAP_INTERVAL`] and
/// force-terminates any whose last output is older than the configured
/// idle ceiling. The ceiling is read fresh on every tick, so a config
/// update takes effect at the next scan.
pub(crate) fn spawn_idle_reaper(
    registry: std::sync::Arc<SessionRegistry>,
    children: Children,
    breaker: SharedBreaker,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("idle reaper shutting down");
                    break;
                }
                () = tokio::time::sleep(REAP_INTERVAL) => {}
            }

            reap_idle(&registry, &children, &breaker).await;
        }
    })
}

/// One reaper pass over a stable snapshot of session ids.
async fn reap_idle(registry: &SessionRegistry, children: &Children, breaker: &SharedBreaker) {
    let cfg = breaker.read().await.clone();
    if !cfg.enabled {
        return;
    }
    let ceiling = Duration::from_secs(cfg.auto_terminate_idle_minutes * 60);
    let now = Instant::now();

    for id in registry.ids().await {
        let Some(session) = registry.get(&id).await else {
            continue;
        };
        let (running, idle) = {
            let record = session.lock().await;
            (record.is_running(), record.idle_elapsed(now))
        };
        if running && idle >= ceiling {
            warn!(session_id = %id, idle_secs = idle.as_secs(), "idle ceiling exceeded");
            force_terminate(&id, &session, children, None, "idle ceiling").await;
        }
    }
}
