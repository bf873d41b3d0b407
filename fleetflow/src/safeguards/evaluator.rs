//! Pure safeguard evaluation.

use super::{Classification, Conditions, Safeguards};
use crate::context::ObservedState;
use crate::exec::DirtyPath;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where in the pipeline conditions are being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    /// Before a step or action mutates anything: clean, branch and path checks.
    Preconditions,
    /// Before commit/push: the staged-changes check.
    Changes,
}

/// A single safeguard condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// `require_clean`
    RequireClean,
    /// `branch`
    Branch,
    /// `branch_in`
    BranchIn,
    /// `paths`
    Paths,
    /// `require_changes`
    RequireChanges,
}

/// Result of checking one condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Which condition.
    pub condition: Condition,
    /// Where it came from.
    pub classification: Classification,
    /// Whether it held.
    pub satisfied: bool,
    /// Explanation, naming the offending paths or branch.
    pub message: String,
}

/// What the caller should do after evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Every condition held.
    Proceed,
    /// A soft-skip condition failed; skip the current action or step.
    Skip(String),
    /// A hard-stop condition failed; halt the repository.
    Halt(String),
}

/// All verdicts for one checkpoint, hard-stop conditions first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Verdicts in evaluation order.
    pub verdicts: Vec<Verdict>,
}

impl Evaluation {
    /// First violated hard-stop condition.
    #[must_use]
    pub fn first_hard_violation(&self) -> Option<&Verdict> {
        self.violations()
            .find(|v| v.classification == Classification::HardStop)
    }

    /// First violated soft-skip condition.
    #[must_use]
    pub fn first_soft_violation(&self) -> Option<&Verdict> {
        self.violations()
            .find(|v| v.classification == Classification::SoftSkip)
    }

    /// Violated conditions.
    pub fn violations(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| !v.satisfied)
    }

    /// Returns true when nothing was violated.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.violations().next().is_none()
    }

    /// Folds the verdicts into a decision; a hard-stop always wins.
    #[must_use]
    pub fn gate(&self) -> Gate {
        if let Some(v) = self.first_hard_violation() {
            return Gate::Halt(format!("hard-stop safeguard: {}", v.message));
        }
        if let Some(v) = self.first_soft_violation() {
            return Gate::Skip(format!("soft-skip safeguard: {}", v.message));
        }
        Gate::Proceed
    }
}

/// Evaluates safeguard blocks against observed repository state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeguardEvaluator;

impl SafeguardEvaluator {
    /// Creates an evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Checks the conditions applicable at `checkpoint`.
    #[must_use]
    pub fn evaluate(
        &self,
        safeguards: &Safeguards,
        state: &ObservedState,
        checkpoint: Checkpoint,
    ) -> Evaluation {
        let mut verdicts = Vec::new();
        for (conditions, classification) in [
            (&safeguards.hard_stop, Classification::HardStop),
            (&safeguards.soft_skip, Classification::SoftSkip),
        ] {
            check_conditions(conditions, classification, state, checkpoint, &mut verdicts);
        }
        Evaluation { verdicts }
    }
}

fn check_conditions(
    conditions: &Conditions,
    classification: Classification,
    state: &ObservedState,
    checkpoint: Checkpoint,
    out: &mut Vec<Verdict>,
) {
    let mut push = |condition, satisfied, message: String| {
        out.push(Verdict {
            condition,
            classification,
            satisfied,
            message,
        });
    };

    match checkpoint {
        Checkpoint::Preconditions => {
            if conditions.require_clean {
                let (satisfied, message) = check_clean(state, &conditions.ignore_dirty_paths);
                push(Condition::RequireClean, satisfied, message);
            }
            if let Some(expected) = &conditions.branch {
                let satisfied = state.branch.as_deref() == Some(expected.as_str());
                push(
                    Condition::Branch,
                    satisfied,
                    format!("expected branch '{expected}', found {}", describe_branch(state)),
                );
            }
            if !conditions.branch_in.is_empty() {
                let satisfied = state
                    .branch
                    .as_ref()
                    .is_some_and(|b| conditions.branch_in.contains(b));
                push(
                    Condition::BranchIn,
                    satisfied,
                    format!(
                        "branch must be one of [{}], found {}",
                        conditions.branch_in.join(", "),
                        describe_branch(state)
                    ),
                );
            }
            if !conditions.paths.is_empty() {
                let missing: Vec<&str> = conditions
                    .paths
                    .iter()
                    .map(String::as_str)
                    .filter(|p| !state.path_exists(p))
                    .collect();
                let message = if missing.is_empty() {
                    "all required paths exist".to_string()
                } else {
                    format!("missing required paths: {}", missing.join(", "))
                };
                push(Condition::Paths, missing.is_empty(), message);
            }
        }
        Checkpoint::Changes => {
            if conditions.require_changes {
                // Unknown counts as satisfied: the caller did not look.
                let satisfied = state.has_staged_changes.unwrap_or(true);
                push(
                    Condition::RequireChanges,
                    satisfied,
                    if satisfied {
                        "changes are staged".to_string()
                    } else {
                        "no changes staged".to_string()
                    },
                );
            }
        }
    }
}

fn describe_branch(state: &ObservedState) -> String {
    state
        .branch
        .as_ref()
        .map_or_else(|| "detached HEAD".to_string(), |b| format!("'{b}'"))
}

fn check_clean(state: &ObservedState, ignore: &[String]) -> (bool, String) {
    let patterns: Vec<Pattern> = ignore.iter().filter_map(|p| Pattern::new(p).ok()).collect();
    let blocking: Vec<&DirtyPath> = state
        .dirty
        .iter()
        .filter(|entry| !is_ignored(&entry.path, ignore, &patterns))
        .collect();

    if blocking.is_empty() {
        return (true, "worktree is clean".to_string());
    }

    let modified: Vec<String> = blocking
        .iter()
        .filter(|e| !e.untracked)
        .map(|e| e.path.display().to_string())
        .collect();
    let untracked: Vec<String> = blocking
        .iter()
        .filter(|e| e.untracked)
        .map(|e| e.path.display().to_string())
        .collect();

    let mut parts = Vec::new();
    if !modified.is_empty() {
        const SHOWN: usize = 5;
        let mut listed = modified.iter().take(SHOWN).cloned().collect::<Vec<_>>().join(", ");
        if modified.len() > SHOWN {
            listed.push_str(&format!(", +{} more", modified.len() - SHOWN));
        }
        parts.push(format!("{} modified ({listed})", modified.len()));
    }
    if !untracked.is_empty() {
        parts.push(format!("untracked: {}", untracked.join(", ")));
    }

    (false, format!("worktree has uncommitted changes: {}", parts.join("; ")))
}

fn is_ignored(path: &Path, raw: &[String], patterns: &[Pattern]) -> bool {
    let rendered = path.to_string_lossy();
    patterns.iter().any(|p| p.matches(&rendered))
        || raw
            .iter()
            .map(|prefix| prefix.trim_end_matches('/'))
            .filter(|prefix| !prefix.is_empty())
            .any(|prefix| path.starts_with(prefix))
}
