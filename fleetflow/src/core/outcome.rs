//! Execution outcome with factory methods.

use super::{OutcomeCode, OutcomeStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How far a skip reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipScope {
    /// Only the current action or step is skipped.
    Step,
    /// Every remaining step for the repository is skipped for the rest of the run.
    Repository,
}

/// Tagged result of a step or action.
///
/// Skips are a variant of their own, never a disguised error: callers have to
/// decide what a `Skipped { scope: Repository }` means for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The effect was performed.
    Applied {
        /// Short description of what happened.
        message: String,
    },
    /// Nothing was done.
    Skipped {
        /// Why it was skipped.
        reason: String,
        /// Whether the skip halts the repository.
        scope: SkipScope,
    },
    /// The step failed.
    Failed {
        /// The rendered error.
        error: String,
    },
}

/// Record of a single pipeline action inside a task step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Action name (e.g. `git-commit`).
    pub action: String,
    /// What happened.
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Machine code.
    pub code: OutcomeCode,
}

impl ActionRecord {
    /// Builds a record from an action name and its outcome.
    #[must_use]
    pub fn new(action: impl Into<String>, outcome: &ExecutionOutcome) -> Self {
        Self {
            action: action.into(),
            outcome: outcome.outcome.clone(),
            code: outcome.code,
        }
    }

    /// Returns the coarse status.
    #[must_use]
    pub fn status(&self) -> OutcomeStatus {
        self.outcome.status()
    }

    /// Returns the human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.outcome.reason()
    }
}

impl Outcome {
    /// Returns the coarse status.
    #[must_use]
    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::Applied { .. } => OutcomeStatus::Applied,
            Self::Skipped { .. } => OutcomeStatus::Skipped,
            Self::Failed { .. } => OutcomeStatus::Failed,
        }
    }

    /// Returns the message, skip reason or error.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Applied { message } => message,
            Self::Skipped { reason, .. } => reason,
            Self::Failed { error } => error,
        }
    }
}

fn failure_code(err: &crate::errors::FleetflowError) -> OutcomeCode {
    use crate::errors::{CommandError, FleetflowError};

    match err {
        FleetflowError::Command(_) => OutcomeCode::CommandFailed,
        FleetflowError::Action(action) => failure_code(action.inner()),
        FleetflowError::Operation(e) if e.chain().any(|c| c.is::<CommandError>()) => {
            OutcomeCode::CommandFailed
        }
        FleetflowError::Capture(_) => OutcomeCode::CaptureMissing,
        FleetflowError::InvalidOptions { .. } => OutcomeCode::InvalidOptions,
        _ => OutcomeCode::ActionFailed,
    }
}

/// The result of running one step against one repository (or once, globally).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Tagged result.
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Machine code.
    pub code: OutcomeCode,
    /// Per-action records when the step ran a task pipeline.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionRecord>,
    /// Operation-specific details.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ExecutionOutcome {
    fn from_parts(outcome: Outcome, code: OutcomeCode) -> Self {
        Self {
            outcome,
            code,
            actions: Vec::new(),
            details: BTreeMap::new(),
        }
    }

    /// Creates an applied outcome.
    #[must_use]
    pub fn applied(message: impl Into<String>) -> Self {
        Self::from_parts(
            Outcome::Applied {
                message: message.into(),
            },
            OutcomeCode::Applied,
        )
    }

    /// Creates a step-scoped skip.
    #[must_use]
    pub fn skipped(code: OutcomeCode, reason: impl Into<String>) -> Self {
        Self::from_parts(
            Outcome::Skipped {
                reason: reason.into(),
                scope: SkipScope::Step,
            },
            code,
        )
    }

    /// Creates a repository-scoped skip caused by a hard-stop safeguard.
    #[must_use]
    pub fn halted(reason: impl Into<String>) -> Self {
        Self::from_parts(
            Outcome::Skipped {
                reason: reason.into(),
                scope: SkipScope::Repository,
            },
            OutcomeCode::SafeguardHardStop,
        )
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(code: OutcomeCode, error: impl Into<String>) -> Self {
        Self::from_parts(
            Outcome::Failed {
                error: error.into(),
            },
            code,
        )
    }

    /// Creates a failed outcome from an error, classifying command failures.
    #[must_use]
    pub fn from_error(err: &crate::errors::FleetflowError) -> Self {
        Self::failed(failure_code(err), err.to_string())
    }

    /// Attaches per-action records.
    #[must_use]
    pub fn with_actions(mut self, actions: Vec<ActionRecord>) -> Self {
        self.actions = actions;
        self
    }

    /// Attaches a detail value.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Replaces a blank reason with the outcome code.
    #[must_use]
    pub fn with_reason_fallback(mut self) -> Self {
        if self.reason().trim().is_empty() {
            let fallback = self.code.to_string();
            match &mut self.outcome {
                Outcome::Applied { message } => *message = fallback,
                Outcome::Skipped { reason, .. } => *reason = fallback,
                Outcome::Failed { error } => *error = fallback,
            }
        }
        self
    }

    /// Returns the coarse status.
    #[must_use]
    pub fn status(&self) -> OutcomeStatus {
        self.outcome.status()
    }

    /// Returns the human-readable reason (message, skip reason or error).
    #[must_use]
    pub fn reason(&self) -> &str {
        self.outcome.reason()
    }

    /// Returns true if this outcome halts every later step for the repository.
    #[must_use]
    pub fn halts_repository(&self) -> bool {
        matches!(
            self.outcome,
            Outcome::Skipped {
                scope: SkipScope::Repository,
                ..
            }
        )
    }

    /// Returns true if the step performed its effect.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.status() == OutcomeStatus::Applied
    }

    /// Returns true if the step was skipped.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.status() == OutcomeStatus::Skipped
    }

    /// Returns true if the step failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status() == OutcomeStatus::Failed
    }
}
