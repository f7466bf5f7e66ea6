//! Session supervision: launch, lifecycle, ceilings, and output access.

pub mod activity;
pub mod governor;
pub mod launcher;
pub(crate) mod monitor;
pub mod pagination;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{BreakerConfig, BreakerConfigPatch, GlobalConfig};
use crate::models::session::Session;
use crate::registry::{SessionRegistry, SharedSession};
use crate::supervisor::activity::{Activity, DEFAULT_IDLE_THRESHOLD_MS};
use crate::supervisor::monitor::{Children, ProcessHandle};
use crate::supervisor::pagination::OutputPage;
use crate::{AppError, Result};

/// Shared, runtime-mutable circuit-breaker policy.
pub(crate) type SharedBreaker = Arc<RwLock<BreakerConfig>>;

/// Outcome of a terminate-all sweep.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TerminateSummary {
    /// Sessions transitioned out of `Running`.
    pub terminated: usize,
    /// Sessions that were already terminal.
    pub skipped: usize,
}

/// The two ways a follow-up prompt can reach the agent.
enum PromptPath {
    /// Session is running; write to the live process's stdin.
    Sending,
    /// Session is terminal; resume the named session first.
    Resuming,
}

struct ReaperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Supervisor for long-lived interactive agent sessions.
///
/// Owns the session registry, the live process table, and the governor's
/// background tasks. All state is process-memory only; nothing survives
/// a supervisor restart (resume relies on the agent's own session-name
/// persistence).
pub struct Supervisor {
    config: Arc<GlobalConfig>,
    breaker: SharedBreaker,
    registry: Arc<SessionRegistry>,
    children: Children,
    /// Serializes admission check, spawn, and registry insert.
    create_gate: Mutex<()>,
    reaper: Mutex<Option<ReaperHandle>>,
}

impl Supervisor {
    /// Build a supervisor and start its idle reaper.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: GlobalConfig) -> Self {
        let breaker: SharedBreaker = Arc::new(RwLock::new(config.breaker.clone()));
        let registry = Arc::new(SessionRegistry::new());
        let children: Children = Arc::new(Mutex::new(HashMap::new()));

        let cancel = CancellationToken::new();
        let task = governor::spawn_idle_reaper(
            Arc::clone(&registry),
            Arc::clone(&children),
            Arc::clone(&breaker),
            cancel.clone(),
        );

        Self {
            config: Arc::new(config),
            breaker,
            registry,
            children,
            create_gate: Mutex::new(()),
            reaper: Mutex::new(Some(ReaperHandle { cancel, task })),
        }
    }

    /// Create a new session for the given task prompt.
    ///
    /// Admission is checked before anything is spawned; a synchronous
    /// spawn failure leaves no registry entry behind. Creation is
    /// serialized through an admission gate held from the ceiling check
    /// through the registry insert, so concurrent calls cannot both
    /// pass the same check.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Admission` when a session ceiling is reached,
    /// or `AppError::Launch` when the agent process fails to spawn.
    pub async fn create(&self, prompt: &str) -> Result<Session> {
        let _admission = self.create_gate.lock().await;
        let cfg = self.breaker.read().await.clone();
        if cfg.enabled {
            let running = self.registry.count_running().await;
            let total = self.registry.len().await;
            governor::check_admission(running, total, &cfg)?;
        }

        let session = Session::new(prompt);
        let mut cmd = launcher::fresh_command(&self.config, &session.session_name, prompt);
        let child = launcher::spawn_agent(&mut cmd)?;
        info!(
            session_id = %session.id,
            session_name = %session.session_name,
            pid = child.id().unwrap_or(0),
            agent = %self.config.agent_bin,
            "agent session started"
        );

        let epoch = session.run_epoch;
        let shared = self.registry.insert(session).await;
        self.attach(child, &shared, epoch, &cfg).await;
        let snapshot = shared.lock().await.clone();
        Ok(snapshot)
    }

    /// Deliver a follow-up prompt, resuming the session if its process
    /// has exited. Returns `false` on any failure: unknown id, exhausted
    /// prompt budget, unwritable stdin, or a failed resume spawn. The
    /// budget check precedes the resume attempt, so a terminal session
    /// at its ceiling is never respawned.
    pub async fn send_prompt(&self, id: &str, text: &str) -> bool {
        let Some(shared) = self.registry.get(id).await else {
            warn!(session_id = %id, "send_prompt on unknown session");
            return false;
        };
        let cfg = self.breaker.read().await.clone();

        let (path, prompt_count, session_name) = {
            let record = shared.lock().await;
            let path = if record.is_running() {
                PromptPath::Sending
            } else {
                PromptPath::Resuming
            };
            (path, record.prompt_count, record.session_name.clone())
        };

        if governor::prompt_budget_exhausted(prompt_count, &cfg) {
            warn!(session_id = %id, prompt_count, "prompt budget exhausted");
            return false;
        }

        let delivered = match path {
            PromptPath::Sending => self.write_to_stdin(id, text).await,
            PromptPath::Resuming => self.resume(id, &shared, &session_name, text, &cfg).await,
        };
        if delivered {
            shared.lock().await.record_prompt(text);
        }
        delivered
    }

    /// Point-in-time snapshot of one session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id.
    pub async fn get(&self, id: &str) -> Result<Session> {
        let shared = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
        let record = shared.lock().await;
        Ok(record.clone())
    }

    /// Snapshots of every session, in creation order.
    pub async fn list(&self) -> Vec<Session> {
        self.registry.snapshot().await
    }

    /// Serve a line window of a session's accumulated output.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id.
    pub async fn output_page(
        &self,
        id: &str,
        offset: i64,
        limit: i64,
        full: bool,
    ) -> Result<OutputPage> {
        let shared = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
        let record = shared.lock().await;
        Ok(pagination::paginate(
            record.output.as_str(),
            offset,
            limit,
            full,
        ))
    }

    /// Classify a session's activity against the given recency threshold
    /// (defaults to [`DEFAULT_IDLE_THRESHOLD_MS`]).
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id.
    pub async fn activity(&self, id: &str, idle_threshold_ms: Option<u64>) -> Result<Activity> {
        let shared = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
        let record = shared.lock().await;
        Ok(activity::classify(
            &record,
            idle_threshold_ms.unwrap_or(DEFAULT_IDLE_THRESHOLD_MS),
            Instant::now(),
        ))
    }

    /// Terminate one session with a graceful kill signal.
    ///
    /// Marks the session `Completed` immediately without waiting for the
    /// process to exit; the exit watcher's later transition is a no-op.
    /// Returns `false` for an unknown id or an already-terminal session.
    pub async fn terminate(&self, id: &str) -> bool {
        let Some(shared) = self.registry.get(id).await else {
            return false;
        };
        governor::force_terminate(id, &shared, &self.children, None, "operator terminate").await
    }

    /// Terminate every running session.
    pub async fn terminate_all(&self) -> TerminateSummary {
        let mut summary = TerminateSummary::default();
        for id in self.registry.ids().await {
            let Some(shared) = self.registry.get(&id).await else {
                continue;
            };
            if governor::force_terminate(&id, &shared, &self.children, None, "terminate all").await
            {
                summary.terminated += 1;
            } else {
                summary.skipped += 1;
            }
        }
        info!(
            terminated = summary.terminated,
            skipped = summary.skipped,
            "terminate-all sweep finished"
        );
        summary
    }

    /// Current circuit-breaker policy.
    pub async fn breaker_config(&self) -> BreakerConfig {
        self.breaker.read().await.clone()
    }

    /// Apply a partial policy update atomically and reschedule the idle
    /// reaper. Already-running sessions are re-checked only at their
    /// next natural check point (next output, timer tick, or prompt).
    pub async fn update_breaker_config(&self, patch: &BreakerConfigPatch) -> BreakerConfig {
        let merged = {
            let mut guard = self.breaker.write().await;
            *guard = guard.apply(patch);
            guard.clone()
        };
        self.restart_reaper().await;
        info!("breaker config updated");
        merged
    }

    /// Terminate every running session and stop the idle reaper.
    pub async fn shutdown(&self) {
        let summary = self.terminate_all().await;
        let mut slot = self.reaper.lock().await;
        if let Some(handle) = slot.take() {
            handle.cancel.cancel();
            let _ = handle.task.await;
        }
        drop(slot);
        info!(terminated = summary.terminated, "supervisor shut down");
    }

    /// Write one newline-terminated prompt to the live process's stdin.
    async fn write_to_stdin(&self, id: &str, text: &str) -> bool {
        let mut guard = self.children.lock().await;
        let Some(stdin) = guard.get_mut(id).and_then(|handle| handle.stdin.as_mut()) else {
            warn!(session_id = %id, "session has no writable stdin");
            return false;
        };
        let mut line = text.to_owned();
        line.push('\n');
        if let Err(err) = stdin.write_all(line.as_bytes()).await {
            warn!(session_id = %id, %err, "stdin write failed");
            return false;
        }
        if let Err(err) = stdin.flush().await {
            warn!(session_id = %id, %err, "stdin flush failed");
            return false;
        }
        true
    }

    /// Resume a terminal session by re-invoking the agent against its
    /// stored session name, with the follow-up prompt as the required
    /// prompt argument. Never creates a second session. A resume that
    /// fails the post-settle health check is rolled back: the
    /// replacement process is terminated and the session returns to a
    /// terminal status, so a `false` result always leaves the session
    /// out of `Running` with no prompt recorded.
    async fn resume(
        &self,
        id: &str,
        shared: &SharedSession,
        session_name: &str,
        text: &str,
        cfg: &BreakerConfig,
    ) -> bool {
        let mut cmd = launcher::resume_command(&self.config, session_name, text);
        let child = match launcher::spawn_agent(&mut cmd) {
            Ok(child) => child,
            Err(err) => {
                warn!(session_id = %id, %err, "resume spawn failed");
                let mut record = shared.lock().await;
                record.error_output.push_str(&format!("[{err}]\n"));
                return false;
            }
        };

        let epoch = {
            let mut record = shared.lock().await;
            record.begin_resume();
            record.run_epoch
        };
        self.attach(child, shared, epoch, cfg).await;

        // Give the agent time to reattach its input listener before the
        // session's stdin is treated as live.
        tokio::time::sleep(launcher::RESUME_SETTLE).await;

        let writable = self
            .children
            .lock()
            .await
            .get(id)
            .is_some_and(|handle| handle.epoch == epoch && handle.stdin.is_some());
        if !writable {
            warn!(session_id = %id, "resumed process has no writable stdin, rolling back");
            governor::force_terminate(
                id,
                shared,
                &self.children,
                Some(epoch),
                "resume health check failed",
            )
            .await;
            return false;
        }

        info!(session_id = %id, session_name, "session resumed");
        true
    }

    /// Bind a freshly spawned process to a session record: the
    /// process-table entry, stream pumps, exit watcher, and the
    /// runtime-ceiling timer.
    async fn attach(&self, mut child: Child, shared: &SharedSession, epoch: u64, cfg: &BreakerConfig) {
        let id = shared.lock().await.id.clone();
        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let run_cancel = CancellationToken::new();

        // The handle must be registered before any watcher runs; a
        // process that exits immediately has to find its own entry to
        // clean up.
        self.children.lock().await.insert(
            id.clone(),
            ProcessHandle {
                pid,
                stdin,
                run_cancel: run_cancel.clone(),
                epoch,
            },
        );

        if let Some(stdout) = stdout {
            monitor::spawn_stdout_pump(
                id.clone(),
                epoch,
                stdout,
                Arc::clone(shared),
                Arc::clone(&self.children),
                Arc::clone(&self.breaker),
            );
        }
        if let Some(stderr) = stderr {
            monitor::spawn_stderr_pump(id.clone(), epoch, stderr, Arc::clone(shared));
        }
        monitor::spawn_exit_watch(
            id.clone(),
            epoch,
            child,
            Arc::clone(shared),
            Arc::clone(&self.children),
        );
        if cfg.enabled {
            governor::spawn_runtime_ceiling(
                id,
                epoch,
                Arc::clone(shared),
                Arc::clone(&self.children),
                Duration::from_secs(cfg.max_runtime_minutes * 60),
                run_cancel,
            );
        }
    }

    /// Cancel the current idle reaper and start a fresh one
    /// (cancel-then-reschedule; timer handles are never stacked).
    async fn restart_reaper(&self) {
        let mut slot = self.reaper.lock().await;
        if let Some(old) = slot.take() {
            old.cancel.cancel();
            old.task.abort();
        }
        let cancel = CancellationToken::new();
        let task = governor::spawn_idle_reaper(
            Arc::clone(&self.registry),
            Arc::clone(&self.children),
            Arc::clone(&self.breaker),
            cancel.clone(),
        );
        *slot = Some(ReaperHandle { cancel, task });
    }
}
