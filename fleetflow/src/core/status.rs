//! Outcome status and machine codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The coarse result of running one step (or action) against one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The step performed its effect.
    Applied,
    /// The step was skipped (safeguard, nothing to do, operator declined...).
    Skipped,
    /// The step failed.
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Machine-readable reason attached to every outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCode {
    /// Effect performed.
    Applied,
    /// Nothing needed to change.
    NoChanges,
    /// The action or step is not configured for this task.
    NotConfigured,
    /// A soft-skip safeguard was violated.
    SafeguardSoftSkip,
    /// A hard-stop safeguard was violated; the repository is halted.
    SafeguardHardStop,
    /// The repository was halted by an earlier hard-stop.
    RepositoryHalted,
    /// No remote is configured for pushing.
    NoRemote,
    /// The push this action depends on was skipped.
    PushSkipped,
    /// The operator declined a confirmation.
    OperatorDeclined,
    /// Dry run; effect not performed.
    DryRun,
    /// The run was cancelled before this step was dispatched.
    Cancelled,
    /// The step exceeded its time limit.
    Timeout,
    /// An external command failed.
    CommandFailed,
    /// An action failed for a reason other than a command.
    ActionFailed,
    /// A restore referenced a value that was never captured.
    CaptureMissing,
    /// Step options were invalid.
    InvalidOptions,
}

impl fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Applied => "applied",
            Self::NoChanges => "no_changes",
            Self::NotConfigured => "not_configured",
            Self::SafeguardSoftSkip => "safeguard_soft_skip",
            Self::SafeguardHardStop => "safeguard_hard_stop",
            Self::RepositoryHalted => "repository_halted",
            Self::NoRemote => "no_remote",
            Self::PushSkipped => "push_skipped",
            Self::OperatorDeclined => "operator_declined",
            Self::DryRun => "dry_run",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::CommandFailed => "command_failed",
            Self::ActionFailed => "action_failed",
            Self::CaptureMissing => "capture_missing",
            Self::InvalidOptions => "invalid_options",
        };
        f.write_str(text)
    }
}
