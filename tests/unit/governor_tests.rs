//! Unit tests for governor admission and prompt-budget checks.

use gosling::config::BreakerConfig;
use gosling::supervisor::governor::{check_admission, prompt_budget_exhausted};
use gosling::AppError;

fn cfg() -> BreakerConfig {
    BreakerConfig {
        max_active_sessions: 2,
        max_total_sessions: 4,
        max_prompts_per_session: 3,
        ..BreakerConfig::default()
    }
}

#[test]
fn admission_passes_under_both_ceilings() {
    assert!(check_admission(1, 3, &cfg()).is_ok());
    assert!(check_admission(0, 0, &cfg()).is_ok());
}

#[test]
fn admission_fails_at_active_ceiling() {
    let err = check_admission(2, 2, &cfg()).unwrap_err();
    assert!(matches!(err, AppError::Admission(_)));
    assert!(err.to_string().contains("active session limit"));
}

#[test]
fn admission_fails_at_total_ceiling() {
    let err = check_admission(1, 4, &cfg()).unwrap_err();
    assert!(matches!(err, AppError::Admission(_)));
    assert!(err.to_string().contains("total session limit"));
}

#[test]
fn prompt_budget_boundary() {
    assert!(!prompt_budget_exhausted(2, &cfg()));
    assert!(prompt_budget_exhausted(3, &cfg()));
    assert!(prompt_budget_exhausted(4, &cfg()));
}

#[test]
fn prompt_budget_ignored_when_disabled() {
    let disabled = BreakerConfig {
        enabled: false,
        ..cfg()
    };
    assert!(!prompt_budget_exhausted(100, &disabled));
}
