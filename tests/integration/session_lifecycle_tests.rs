//! Integration tests for session creation, exit handling, and output
//! access against a fake agent process.

use gosling::config::BreakerConfig;
use gosling::models::session::SessionStatus;
use gosling::supervisor::activity::Activity;
use gosling::{AppError, Supervisor};
use tempfile::TempDir;

use super::test_helpers::{
    config_for, fake_agent, wait_for_session, ECHO_AGENT, POLL_TIMEOUT, THREE_LINE_AGENT,
};

#[tokio::test]
async fn create_starts_a_running_session_and_accumulates_output() {
    let dir = TempDir::new().expect("tempdir");
    let agent = fake_agent(&dir, ECHO_AGENT);
    let supervisor = Supervisor::new(config_for(&agent, BreakerConfig::default()));

    let session = supervisor.create("say hello").await.expect("create");
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(session.initial_task, "say hello");

    let saw_ready = wait_for_session(&supervisor, &session.id, POLL_TIMEOUT, |s| {
        s.output.as_str().contains("ready")
    })
    .await;
    assert!(saw_ready, "agent startup output never arrived");

    supervisor.shutdown().await;
}

#[tokio::test]
async fn synchronous_spawn_failure_leaves_no_registry_entry() {
    let missing = std::path::PathBuf::from("/nonexistent/agent-binary");
    let supervisor = Supervisor::new(config_for(&missing, BreakerConfig::default()));

    let err = supervisor.create("task").await.unwrap_err();
    assert!(matches!(err, AppError::Launch(_)));
    assert!(supervisor.list().await.is_empty());

    supervisor.shutdown().await;
}

#[tokio::test]
async fn clean_exit_completes_the_session() {
    let dir = TempDir::new().expect("tempdir");
    let agent = fake_agent(&dir, "echo done\nexit 0");
    let supervisor = Supervisor::new(config_for(&agent, BreakerConfig::default()));

    let session = supervisor.create("quick task").await.expect("create");
    let completed = wait_for_session(&supervisor, &session.id, POLL_TIMEOUT, |s| {
        s.status == SessionStatus::Completed
    })
    .await;
    assert!(completed);

    let snapshot = supervisor.get(&session.id).await.expect("get");
    assert!(snapshot.ended_at.is_some());
    assert!(snapshot.output.as_str().contains("done"));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn abnormal_exit_errors_the_session_with_detail() {
    let dir = TempDir::new().expect("tempdir");
    let agent = fake_agent(&dir, "exit 7");
    let supervisor = Supervisor::new(config_for(&agent, BreakerConfig::default()));

    let session = supervisor.create("doomed task").await.expect("create");
    let errored = wait_for_session(&supervisor, &session.id, POLL_TIMEOUT, |s| {
        s.status == SessionStatus::Error
    })
    .await;
    assert!(errored);

    let snapshot = supervisor.get(&session.id).await.expect("get");
    assert!(snapshot.error_output.contains("exited with code 7"));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn stderr_goes_to_the_error_buffer_not_the_output() {
    let dir = TempDir::new().expect("tempdir");
    let agent = fake_agent(&dir, "echo oops 1>&2\nwhile IFS= read -r line; do :; done");
    let supervisor = Supervisor::new(config_for(&agent, BreakerConfig::default()));

    let session = supervisor.create("task").await.expect("create");
    let saw_stderr = wait_for_session(&supervisor, &session.id, POLL_TIMEOUT, |s| {
        s.error_output.contains("oops")
    })
    .await;
    assert!(saw_stderr);

    let snapshot = supervisor.get(&session.id).await.expect("get");
    assert!(!snapshot.output.as_str().contains("oops"));
    assert_eq!(snapshot.status, SessionStatus::Running);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let dir = TempDir::new().expect("tempdir");
    let agent = fake_agent(&dir, ECHO_AGENT);
    let supervisor = Supervisor::new(config_for(&agent, BreakerConfig::default()));

    assert!(matches!(
        supervisor.get("no-such-id").await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        supervisor.output_page("no-such-id", 0, 10, false).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        supervisor.activity("no-such-id", None).await.unwrap_err(),
        AppError::NotFound(_)
    ));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn list_preserves_creation_order() {
    let dir = TempDir::new().expect("tempdir");
    let agent = fake_agent(&dir, ECHO_AGENT);
    let supervisor = Supervisor::new(config_for(&agent, BreakerConfig::default()));

    let first = supervisor.create("first").await.expect("create");
    let second = supervisor.create("second").await.expect("create");

    let listed: Vec<String> = supervisor.list().await.into_iter().map(|s| s.id).collect();
    assert_eq!(listed, vec![first.id, second.id]);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn end_to_end_create_page_terminate_resume() {
    let dir = TempDir::new().expect("tempdir");
    let agent = fake_agent(&dir, THREE_LINE_AGENT);
    let supervisor = Supervisor::new(config_for(&agent, BreakerConfig::default()));

    // Create: session is running.
    let session = supervisor.create("ping").await.expect("create");
    assert_eq!(session.status, SessionStatus::Running);

    // Three output chunks arrive.
    let got_lines = wait_for_session(&supervisor, &session.id, POLL_TIMEOUT, |s| {
        s.output.line_count() >= 3
    })
    .await;
    assert!(got_lines);

    // Page the first two lines.
    let page = supervisor
        .output_page(&session.id, 0, 2, false)
        .await
        .expect("page");
    assert_eq!(page.text, "alpha\nbeta");
    assert_eq!(page.start_line, 0);
    assert_eq!(page.end_line, 2);
    assert!(page.has_more);

    // Terminate, then the session reads as idle.
    assert!(supervisor.terminate(&session.id).await);
    let activity = supervisor.activity(&session.id, None).await.expect("activity");
    assert_eq!(activity, Activity::Idle { idle_ms: None });

    // A follow-up prompt resumes the exited session.
    assert!(supervisor.send_prompt(&session.id, "pong").await);
    let snapshot = supervisor.get(&session.id).await.expect("get");
    assert_eq!(snapshot.status, SessionStatus::Running);
    assert_eq!(snapshot.id, session.id);

    supervisor.shutdown().await;
}
