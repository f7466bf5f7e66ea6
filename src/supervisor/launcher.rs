//! Agent process launcher.
//!
//! Builds the agent CLI invocation for fresh starts and resumes and
//! spawns it with piped streams. Each spawn carries `kill_on_drop(true)`
//! for safety. Terminal formatting is suppressed through environment
//! overrides so downstream consumers can parse the output as plain text.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// Settle time after a resume spawn before the agent's stdin is
/// considered usable. The agent needs a moment to reattach its input
/// listener to the named session.
pub const RESUME_SETTLE: Duration = Duration::from_millis(500);

/// Launch-time suffix telling the agent to keep the session open for
/// follow-up input. Never stored in the session's prompt history.
const KEEP_OPEN_SUFFIX: &str = "\n\nThe user may send follow-up messages to this session. \
     Stay in interactive mode and wait for further instructions after answering.";

/// Amend the caller's initial prompt for the fresh-start invocation.
#[must_use]
pub fn amended_initial_prompt(prompt: &str) -> String {
    format!("{prompt}{KEEP_OPEN_SUFFIX}")
}

/// Base `run` invocation shared by fresh starts and resumes.
fn base_command(config: &GlobalConfig) -> Command {
    let mut cmd = Command::new(&config.agent_bin);
    cmd.arg("run")
        .args(&config.agent_args)
        .env("TERM", "dumb")
        .env("NO_COLOR", "1")
        .env("CLICOLOR", "0")
        .env("CLICOLOR_FORCE", "0")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Build the invocation for a fresh interactive session.
///
/// The prompt passed to the agent is the amended form; the caller stores
/// the original text in the session record.
#[must_use]
pub fn fresh_command(config: &GlobalConfig, session_name: &str, prompt: &str) -> Command {
    let mut cmd = base_command(config);
    cmd.arg("--interactive")
        .arg("--name")
        .arg(session_name)
        .arg("--text")
        .arg(amended_initial_prompt(prompt));
    cmd
}

/// Build the invocation that resumes a previously named session.
///
/// The agent requires a prompt argument even to resume, so the follow-up
/// prompt rides along as the required `--text` value.
#[must_use]
pub fn resume_command(config: &GlobalConfig, session_name: &str, prompt: &str) -> Command {
    let mut cmd = base_command(config);
    cmd.arg("--name")
        .arg(session_name)
        .arg("--resume")
        .arg("--text")
        .arg(prompt);
    cmd
}

/// Spawn the agent process.
///
/// # Errors
///
/// Returns `AppError::Launch` when the OS refuses the spawn (missing
/// binary, fork/exec failure).
pub fn spawn_agent(cmd: &mut Command) -> Result<Child> {
    cmd.spawn()
        .map_err(|err| AppError::Launch(format!("failed to spawn agent process: {err}")))
}
