//! Stream and exit bindings for spawned agent processes.
//!
//! Every spawn registers three tasks: stdout → output accumulator (with
//! ceiling enforcement), stderr → the session's error buffer, and
//! process exit → status transition. Each task carries the run epoch it
//! was bound under and goes inert if the session has since been resumed
//! with a new process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::session::SessionStatus;
use crate::registry::SharedSession;
use crate::supervisor::{governor, SharedBreaker};

/// Live process state for one session's current run segment.
pub(crate) struct ProcessHandle {
    /// OS pid, if the runtime reported one.
    pub pid: Option<u32>,
    /// Agent stdin; follow-up prompts are written here.
    pub stdin: Option<ChildStdin>,
    /// Cancels the segment's runtime-ceiling timer.
    pub run_cancel: CancellationToken,
    /// Run epoch this handle belongs to.
    pub epoch: u64,
}

/// Shared table of live process handles keyed by session id.
pub(crate) type Children = Arc<Mutex<HashMap<String, ProcessHandle>>>;

/// Incremental UTF-8 decoder for process streams.
///
/// A read boundary can split a multi-byte character; the undecodable
/// tail of each read is carried into the next one instead of being
/// lossy-decoded on its own.
#[derive(Default)]
struct StreamDecoder {
    pending: Vec<u8>,
}

impl StreamDecoder {
    /// Decode the next read, emitting every character completed so far.
    fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(bytes);
        let mut out = String::with_capacity(buf.len());
        let mut rest: &[u8] = &buf;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            // Incomplete sequence at the end of this read.
                            rest = tail;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is left at end of stream.
    fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

/// Pump agent stdout into the session's output accumulator, enforcing
/// the output-byte ceiling on every append.
pub(crate) fn spawn_stdout_pump(
    id: String,
    epoch: u64,
    mut stdout: ChildStdout,
    session: SharedSession,
    children: Children,
    breaker: SharedBreaker,
) {
    let _task = tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        let mut decoder = StreamDecoder::default();
        loop {
            let (chunk, eof) = match stdout.read(&mut buf).await {
                Ok(0) => (decoder.finish(), true),
                Ok(n) => (decoder.decode(&buf[..n]), false),
                Err(err) => {
                    warn!(session_id = %id, %err, "stdout read failed");
                    (decoder.finish(), true)
                }
            };
            if !chunk.is_empty() {
                let cfg = breaker.read().await.clone();
                let ceiling_hit = {
                    let mut record = session.lock().await;
                    if record.run_epoch != epoch {
                        return;
                    }
                    governor::admit_output(&mut record, &chunk, &cfg)
                };
                if ceiling_hit {
                    warn!(session_id = %id, "output ceiling reached, terminating session");
                    governor::force_terminate(
                        &id,
                        &session,
                        &children,
                        Some(epoch),
                        "output ceiling",
                    )
                    .await;
                    return;
                }
            }
            if eof {
                break;
            }
        }
    });
}

/// Pump agent stderr into the session's error buffer.
pub(crate) fn spawn_stderr_pump(
    id: String,
    epoch: u64,
    mut stderr: ChildStderr,
    session: SharedSession,
) {
    let _task = tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        let mut decoder = StreamDecoder::default();
        loop {
            let (chunk, eof) = match stderr.read(&mut buf).await {
                Ok(0) => (decoder.finish(), true),
                Ok(n) => (decoder.decode(&buf[..n]), false),
                Err(err) => {
                    warn!(session_id = %id, %err, "stderr read failed");
                    (decoder.finish(), true)
                }
            };
            if !chunk.is_empty() {
                let mut record = session.lock().await;
                if record.run_epoch != epoch {
                    return;
                }
                record.error_output.push_str(&chunk);
            }
            if eof {
                break;
            }
        }
    });
}

/// Wait for the agent process to exit and close the run segment.
///
/// Exit code 0 maps to `Completed`, anything else to `Error` with the
/// exit description appended to the error buffer. The transition is
/// idempotent with an earlier explicit terminate: a session already
/// terminal keeps its first outcome.
pub(crate) fn spawn_exit_watch(
    id: String,
    epoch: u64,
    mut child: Child,
    session: SharedSession,
    children: Children,
) {
    let _task = tokio::spawn(async move {
        let (status, detail) = match child.wait().await {
            Ok(exit) if exit.success() => (SessionStatus::Completed, None),
            Ok(exit) => {
                let text = exit.code().map_or_else(
                    || "terminated by signal".to_owned(),
                    |code| format!("exited with code {code}"),
                );
                (SessionStatus::Error, Some(text))
            }
            Err(err) => (SessionStatus::Error, Some(format!("wait failed: {err}"))),
        };

        {
            let mut record = session.lock().await;
            if record.run_epoch == epoch {
                if record.is_running() {
                    if let Some(ref text) = detail {
                        record.error_output.push_str(&format!("[agent {text}]\n"));
                    }
                }
                record.close_segment(status);
            }
        }

        // Drop this segment's handle; a resume may already have replaced it.
        let mut guard = children.lock().await;
        if guard.get(&id).is_some_and(|handle| handle.epoch == epoch) {
            if let Some(handle) = guard.remove(&id) {
                handle.run_cancel.cancel();
            }
        }
        drop(guard);

        info!(
            session_id = %id,
            outcome = detail.as_deref().unwrap_or("exited normally (code 0)"),
            "agent process exited"
        );
    });
}
