//! Session model and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use super::output::OutputBuffer;

/// Lifecycle status for a supervised agent session.
///
/// Monotonic within one run segment (`Running` → terminal); a terminal
/// session may re-enter `Running` via resume.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Agent process is live.
    Running,
    /// Agent exited cleanly or was terminated.
    Completed,
    /// Agent exited abnormally or failed to launch.
    Error,
}

/// One accepted prompt, in send order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PromptRecord {
    /// Prompt text exactly as the caller submitted it.
    pub text: String,
    /// Submission timestamp.
    pub sent_at: DateTime<Utc>,
}

/// A supervised agent session and its accumulated state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Unique identifier, assigned at creation, never reused.
    pub id: String,
    /// Stable external handle used to resume the agent after exit.
    pub session_name: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Original request that created the session; immutable.
    pub initial_task: String,
    /// Ordered, append-only prompt history; entry 0 is the initial task.
    pub prompt_history: Vec<PromptRecord>,
    /// Accumulated stdout.
    pub output: OutputBuffer,
    /// Accumulated stderr plus launch/exit failure messages.
    pub error_output: String,
    /// Start of the current run segment.
    pub started_at: DateTime<Utc>,
    /// End of the last run segment; unset while running, cleared on resume.
    pub ended_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent stdout append.
    pub last_output_at: DateTime<Utc>,
    /// Follow-up prompts accepted via send; not reset on resume.
    pub prompt_count: u32,
    /// Monotonic clock of the most recent stdout append, for idle math.
    #[serde(skip)]
    pub(crate) last_output_instant: Instant,
    /// Bumped on every (re)start so stale stream handlers become no-ops.
    #[serde(skip)]
    pub(crate) run_epoch: u64,
}

impl Session {
    /// Construct a new running session for the given initial task.
    #[must_use]
    pub fn new(initial_task: &str) -> Self {
        let id = Uuid::new_v4().to_string();
        let session_name = format!("gosling-{}", &id[..8]);
        let now = Utc::now();
        Self {
            id,
            session_name,
            status: SessionStatus::Running,
            initial_task: initial_task.to_owned(),
            prompt_history: vec![PromptRecord {
                text: initial_task.to_owned(),
                sent_at: now,
            }],
            output: OutputBuffer::default(),
            error_output: String::new(),
            started_at: now,
            ended_at: None,
            last_output_at: now,
            prompt_count: 0,
            last_output_instant: Instant::now(),
            run_epoch: 0,
        }
    }

    /// Whether the session's agent process is live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Append a stdout chunk and stamp the output clocks.
    pub(crate) fn note_output(&mut self, chunk: &str) {
        self.output.append(chunk);
        self.last_output_at = Utc::now();
        self.last_output_instant = Instant::now();
    }

    /// Record an accepted follow-up prompt.
    pub(crate) fn record_prompt(&mut self, text: &str) {
        self.prompt_history.push(PromptRecord {
            text: text.to_owned(),
            sent_at: Utc::now(),
        });
        self.prompt_count += 1;
    }

    /// Flip back to `Running` for a new run segment.
    pub(crate) fn begin_resume(&mut self) {
        self.status = SessionStatus::Running;
        self.started_at = Utc::now();
        self.ended_at = None;
        self.run_epoch += 1;
    }

    /// Close the current run segment with a terminal status.
    ///
    /// Idempotent: a session already terminal keeps its first outcome.
    pub(crate) fn close_segment(&mut self, status: SessionStatus) {
        if self.status == SessionStatus::Running {
            self.status = status;
            self.ended_at = Some(Utc::now());
        }
    }

    /// Time elapsed since the last stdout append, measured at `now`.
    #[must_use]
    pub fn idle_elapsed(&self, now: Instant) -> std::time::Duration {
        now.duration_since(self.last_output_instant)
    }
}
