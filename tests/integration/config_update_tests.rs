//! Integration tests for runtime circuit-breaker reconfiguration.

use gosling::config::{BreakerConfig, BreakerConfigPatch};
use gosling::Supervisor;
use tempfile::TempDir;

use super::test_helpers::{config_for, fake_agent, ECHO_AGENT};

#[tokio::test]
async fn breaker_config_reflects_construction() {
    let dir = TempDir::new().expect("tempdir");
    let agent = fake_agent(&dir, ECHO_AGENT);
    let breaker = BreakerConfig {
        max_active_sessions: 3,
        ..BreakerConfig::default()
    };
    let supervisor = Supervisor::new(config_for(&agent, breaker.clone()));

    assert_eq!(supervisor.breaker_config().await, breaker);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn update_merges_patch_and_returns_the_new_policy() {
    let dir = TempDir::new().expect("tempdir");
    let agent = fake_agent(&dir, ECHO_AGENT);
    let supervisor = Supervisor::new(config_for(&agent, BreakerConfig::default()));

    let patch = BreakerConfigPatch {
        max_prompts_per_session: Some(2),
        auto_terminate_idle_minutes: Some(5),
        ..BreakerConfigPatch::default()
    };
    let merged = supervisor.update_breaker_config(&patch).await;

    assert_eq!(merged.max_prompts_per_session, 2);
    assert_eq!(merged.auto_terminate_idle_minutes, 5);
    assert_eq!(merged.max_active_sessions, BreakerConfig::default().max_active_sessions);
    assert_eq!(supervisor.breaker_config().await, merged);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn raised_ceiling_admits_future_creates() {
    let dir = TempDir::new().expect("tempdir");
    let agent = fake_agent(&dir, ECHO_AGENT);
    let breaker = BreakerConfig {
        max_active_sessions: 1,
        ..BreakerConfig::default()
    };
    let supervisor = Supervisor::new(config_for(&agent, breaker));

    supervisor.create("one").await.expect("create");
    assert!(supervisor.create("two").await.is_err());

    let patch = BreakerConfigPatch {
        max_active_sessions: Some(2),
        ..BreakerConfigPatch::default()
    };
    supervisor.update_breaker_config(&patch).await;

    supervisor.create("two again").await.expect("create after raise");

    supervisor.shutdown().await;
}
