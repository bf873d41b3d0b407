//! Test assertions for execution outcomes.

use crate::core::{ExecutionOutcome, OutcomeCode, OutcomeStatus};

/// Asserts that the outcome applied.
pub fn assert_outcome_applied(outcome: &ExecutionOutcome) {
    assert_eq!(
        outcome.status(),
        OutcomeStatus::Applied,
        "Expected applied, got {:?}: {}",
        outcome.code,
        outcome.reason()
    );
}

/// Asserts that the outcome was skipped.
pub fn assert_outcome_skipped(outcome: &ExecutionOutcome) {
    assert_eq!(
        outcome.status(),
        OutcomeStatus::Skipped,
        "Expected skipped, got {:?}: {}",
        outcome.code,
        outcome.reason()
    );
}

/// Asserts that the outcome failed.
pub fn assert_outcome_failed(outcome: &ExecutionOutcome) {
    assert_eq!(
        outcome.status(),
        OutcomeStatus::Failed,
        "Expected failed, got {:?}: {}",
        outcome.code,
        outcome.reason()
    );
}

/// Asserts the machine code.
pub fn assert_outcome_code(outcome: &ExecutionOutcome, expected: OutcomeCode) {
    assert_eq!(
        outcome.code, expected,
        "Expected code {:?}, got {:?} ({})",
        expected, outcome.code, outcome.reason()
    );
}

/// Asserts that the reason mentions `needle`.
pub fn assert_reason_contains(outcome: &ExecutionOutcome, needle: &str) {
    assert!(
        outcome.reason().contains(needle),
        "Expected reason to contain '{}', got '{}'",
        needle,
        outcome.reason()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertions_pass() {
        let outcome = ExecutionOutcome::skipped(OutcomeCode::NoRemote, "remote 'origin' is not configured");
        assert_outcome_skipped(&outcome);
        assert_outcome_code(&outcome, OutcomeCode::NoRemote);
        assert_reason_contains(&outcome, "origin");
    }

    #[test]
    #[should_panic(expected = "Expected applied")]
    fn test_assert_applied_panics() {
        assert_outcome_applied(&ExecutionOutcome::failed(OutcomeCode::ActionFailed, "boom"));
    }
}
