//! Error types for the fleetflow engine.
//!
//! Plan errors are fatal and reported before any repository is touched.
//! Command and action errors are folded into `failed` outcomes by the step
//! executor; only infrastructure errors and the aggregate [`RunError`] ever
//! reach the caller of a run.

use crate::runner::RunSummary;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for fleetflow operations.
#[derive(Debug, Error)]
pub enum FleetflowError {
    /// The workflow plan is malformed.
    #[error("{0}")]
    Plan(#[from] PlanError),

    /// An external command could not be run or exited unsuccessfully.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// A pipeline action failed against a repository.
    #[error("{0}")]
    Action(#[from] ActionError),

    /// A capture or restore could not be honoured.
    #[error("{0}")]
    Capture(#[from] CaptureError),

    /// A template could not be rendered.
    #[error("Template error: {0}")]
    Template(String),

    /// Step options could not be interpreted by the target operation.
    #[error("Invalid options for '{command}': {message}")]
    InvalidOptions {
        /// The command path the options were meant for.
        command: String,
        /// What was wrong with them.
        message: String,
    },

    /// A registered operation failed.
    #[error("{0:#}")]
    Operation(#[from] anyhow::Error),

    /// Repository discovery failed.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// The interactive prompt failed.
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// One or more steps failed during the run.
    #[error("{0}")]
    Run(#[from] Box<RunError>),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for FleetflowError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for FleetflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<minijinja::Error> for FleetflowError {
    fn from(err: minijinja::Error) -> Self {
        Self::Template(err.to_string())
    }
}

/// Metadata about a plan error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PlanErrorInfo {
    /// Error code (e.g., "PLAN-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl PlanErrorInfo {
    /// Creates error info with a code and summary.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Errors raised while parsing, normalizing or scheduling a plan.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    /// The dependency graph contains a cycle.
    #[error("{0}")]
    Cycle(#[from] CyclicDependencyError),

    /// A step references a dependency that does not exist.
    #[error("{0}")]
    UnknownReference(#[from] UnknownStepReferenceError),

    /// Any other validation failure (duplicates, unknown commands, bad documents).
    #[error("{0}")]
    Invalid(#[from] PlanValidationError),
}

impl PlanError {
    /// Returns the diagnostic info attached to the error.
    #[must_use]
    pub fn error_info(&self) -> Option<&PlanErrorInfo> {
        match self {
            Self::Cycle(e) => Some(&e.error_info),
            Self::UnknownReference(e) => Some(&e.error_info),
            Self::Invalid(e) => e.error_info.as_ref(),
        }
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info().map(|info| info.code.as_str())
    }
}

/// Error raised when plan validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PlanValidationError {
    /// The error message.
    pub message: String,
    /// The steps involved in the error.
    pub steps: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<PlanErrorInfo>,
}

impl PlanValidationError {
    /// Creates a new plan validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the steps involved.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: PlanErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// A step name appears more than once.
    #[must_use]
    pub fn duplicate_step(name: &str) -> Self {
        Self::new(format!("Step name '{name}' is declared more than once"))
            .with_steps(vec![name.to_string()])
            .with_error_info(
                PlanErrorInfo::new("PLAN-DUPLICATE", format!("Duplicate step '{name}'"))
                    .with_fix_hint("Give every step a unique name."),
            )
    }

    /// A step names a command with no registered operation.
    #[must_use]
    pub fn unknown_command(step: &str, command: &str) -> Self {
        Self::new(format!("Step '{step}' uses unknown command '{command}'"))
            .with_steps(vec![step.to_string()])
            .with_error_info(
                PlanErrorInfo::new(
                    "PLAN-UNKNOWN-COMMAND",
                    format!("No operation registered for '{command}'"),
                )
                .with_context_entry("command", command),
            )
    }

    /// A task step names a task the plan does not define.
    #[must_use]
    pub fn unknown_task(step: &str, task: &str) -> Self {
        Self::new(format!("Step '{step}' runs unknown task '{task}'"))
            .with_steps(vec![step.to_string()])
            .with_error_info(
                PlanErrorInfo::new("PLAN-UNKNOWN-TASK", format!("Task '{task}' is not defined"))
                    .with_fix_hint("Define the task under the plan's `tasks` map."),
            )
    }

    /// The plan document could not be read.
    #[must_use]
    pub fn invalid_document(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(format!("Invalid plan document: {message}"))
            .with_error_info(PlanErrorInfo::new("PLAN-INVALID", message))
    }

    /// A `${name}` reference has no value and no default.
    #[must_use]
    pub fn undefined_variable(name: &str) -> Self {
        Self::new(format!("Plan variable '{name}' is not defined"))
            .with_error_info(
                PlanErrorInfo::new("PLAN-INVALID", format!("Undefined variable '{name}'"))
                    .with_fix_hint("Pass the variable at run time or write `${name:-default}`.")
                    .with_context_entry("variable", name),
            )
    }
}

/// Error raised when a cycle is detected in the step graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in plan: {}", cycle_path.join(" -> "))]
pub struct CyclicDependencyError {
    /// The path of steps forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: PlanErrorInfo,
}

impl CyclicDependencyError {
    /// Creates a new cycle error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = PlanErrorInfo::new(
            "PLAN-CYCLE",
            format!("Plan contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the `after` entries in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when a step depends on a step the plan does not contain.
#[derive(Debug, Clone, Error)]
#[error("Step '{step}' depends on unknown step '{missing}'")]
pub struct UnknownStepReferenceError {
    /// The step holding the dangling reference.
    pub step: String,
    /// The name that could not be resolved.
    pub missing: String,
    /// Contract error info.
    pub error_info: PlanErrorInfo,
}

impl UnknownStepReferenceError {
    /// Creates a new unknown reference error.
    #[must_use]
    pub fn new(step: impl Into<String>, missing: impl Into<String>) -> Self {
        let step = step.into();
        let missing = missing.into();
        let info = PlanErrorInfo::new(
            "PLAN-UNKNOWN-REF",
            format!("Dependency '{missing}' not found"),
        )
        .with_fix_hint("Check the spelling in `after`, or declare the missing step.")
        .with_context_entry("step", step.clone());

        Self {
            step,
            missing,
            error_info: info,
        }
    }
}

/// Failure of an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be started.
    #[error("Failed to execute `{command}` in {}: {source}", cwd.display())]
    Spawn {
        /// The rendered command line.
        command: String,
        /// Working directory.
        cwd: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a non-zero status.
    #[error("`{command}` failed in {} (exit code {exit_code}): {stderr}", cwd.display())]
    Failed {
        /// The rendered command line.
        command: String,
        /// Working directory.
        cwd: PathBuf,
        /// Process exit code (-1 when terminated by a signal).
        exit_code: i32,
        /// Trimmed standard error.
        stderr: String,
    },
}

impl CommandError {
    /// Returns the exit code for a failed command.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Spawn { .. } => None,
            Self::Failed { exit_code, .. } => Some(*exit_code),
        }
    }
}

/// A pipeline action failed; wraps the underlying error with where it happened.
#[derive(Debug, Error)]
#[error("{action} failed in {}: {source}", repository.display())]
pub struct ActionError {
    /// The action (or operation) name.
    pub action: String,
    /// Repository path.
    pub repository: PathBuf,
    /// The underlying failure.
    #[source]
    pub source: Box<FleetflowError>,
}

impl ActionError {
    /// Wraps an error with action and repository context.
    pub fn new(
        action: impl Into<String>,
        repository: impl Into<PathBuf>,
        source: impl Into<FleetflowError>,
    ) -> Self {
        Self {
            action: action.into(),
            repository: repository.into(),
            source: Box::new(source.into()),
        }
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn inner(&self) -> &FleetflowError {
        &self.source
    }
}

/// Capture/restore failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// Restore asked for a name that was never captured.
    #[error("No captured value named '{name}' for {}", repository.display())]
    Missing {
        /// Capture name.
        name: String,
        /// Repository path.
        repository: PathBuf,
    },
}

/// Aggregate error returned when at least one step failed.
#[derive(Debug, Error)]
#[error("{} of {} step outcome(s) failed", summary.failed, summary.total)]
pub struct RunError {
    /// The full run summary.
    pub summary: RunSummary,
}

impl RunError {
    /// Creates a run error from a summary.
    #[must_use]
    pub fn new(summary: RunSummary) -> Self {
        Self { summary }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = FleetflowError> = std::result::Result<T, E>;
