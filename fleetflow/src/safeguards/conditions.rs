//! Safeguard specification types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a violated condition halts the repository or skips the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Violation halts every remaining step for the repository.
    HardStop,
    /// Violation skips only the current action or step.
    SoftSkip,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardStop => write!(f, "hard-stop"),
            Self::SoftSkip => write!(f, "soft-skip"),
        }
    }
}

/// A set of conditions of one classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Conditions {
    /// The worktree must have no changes outside the ignore list.
    #[serde(default)]
    pub require_clean: bool,
    /// Globs (or path prefixes) whose dirty files do not count.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_dirty_paths: Vec<String>,
    /// The current branch must equal this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// The current branch must be one of these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branch_in: Vec<String>,
    /// Every listed repository-relative path must exist.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    /// Something must be staged (checked right before committing).
    #[serde(default)]
    pub require_changes: bool,
}

impl Conditions {
    /// Returns true when no condition is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.require_clean
            && self.branch.is_none()
            && self.branch_in.is_empty()
            && self.paths.is_empty()
            && !self.require_changes
    }

    fn merge(&mut self, other: Self) {
        self.require_clean |= other.require_clean;
        self.ignore_dirty_paths.extend(other.ignore_dirty_paths);
        if other.branch.is_some() {
            self.branch = other.branch;
        }
        self.branch_in.extend(other.branch_in);
        self.paths.extend(other.paths);
        self.require_changes |= other.require_changes;
    }
}

/// A safeguard block: hard-stop and soft-skip condition sets.
///
/// Accepts the namespaced form (`hard_stop:` / `soft_skip:`) and the legacy
/// flat form, whose conditions are all treated as hard-stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSafeguards")]
pub struct Safeguards {
    /// Conditions whose violation halts the repository.
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub hard_stop: Conditions,
    /// Conditions whose violation skips the current step.
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub soft_skip: Conditions,
}

impl Safeguards {
    /// Creates an empty block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hard-stop conditions.
    #[must_use]
    pub fn with_hard_stop(mut self, conditions: Conditions) -> Self {
        self.hard_stop = conditions;
        self
    }

    /// Sets the soft-skip conditions.
    #[must_use]
    pub fn with_soft_skip(mut self, conditions: Conditions) -> Self {
        self.soft_skip = conditions;
        self
    }

    /// Returns true when neither class has a condition.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hard_stop.is_empty() && self.soft_skip.is_empty()
    }
}

#[derive(Deserialize)]
struct RawSafeguards {
    #[serde(default)]
    hard_stop: Option<Conditions>,
    #[serde(default)]
    soft_skip: Option<Conditions>,
    #[serde(default)]
    require_clean: bool,
    #[serde(default)]
    ignore_dirty_paths: Vec<String>,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    branch_in: Vec<String>,
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    require_changes: bool,
}

impl From<RawSafeguards> for Safeguards {
    fn from(raw: RawSafeguards) -> Self {
        let legacy = Conditions {
            require_clean: raw.require_clean,
            ignore_dirty_paths: raw.ignore_dirty_paths,
            branch: raw.branch,
            branch_in: raw.branch_in,
            paths: raw.paths,
            require_changes: raw.require_changes,
        };

        let mut hard_stop = raw.hard_stop.unwrap_or_default();
        hard_stop.merge(legacy);

        Self {
            hard_stop,
            soft_skip: raw.soft_skip.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_namespaced_form() {
        let yaml = "hard_stop:\n  require_clean: true\n  ignore_dirty_paths: [target]\nsoft_skip:\n  branch_in: [main, master]\n";
        let safeguards: Safeguards = serde_yaml::from_str(yaml).unwrap();

        assert!(safeguards.hard_stop.require_clean);
        assert_eq!(safeguards.hard_stop.ignore_dirty_paths, vec!["target".to_string()]);
        assert_eq!(safeguards.soft_skip.branch_in, vec!["main".to_string(), "master".to_string()]);
    }

    #[test]
    fn test_legacy_form_is_hard_stop() {
        let yaml = "require_clean: true\nbranch: main\npaths: [Cargo.toml]\n";
        let safeguards: Safeguards = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(
            safeguards,
            Safeguards::new().with_hard_stop(Conditions {
                require_clean: true,
                branch: Some("main".into()),
                paths: vec!["Cargo.toml".into()],
                ..Conditions::default()
            })
        );
        assert!(safeguards.soft_skip.is_empty());
    }

    #[test]
    fn test_empty_block() {
        let safeguards: Safeguards = serde_yaml::from_str("{}").unwrap();
        assert!(safeguards.is_empty());
    }

    #[test]
    fn test_unknown_condition_rejected() {
        let result: Result<Safeguards, _> = serde_yaml::from_str("hard_stop:\n  require_cleen: true\n");
        assert!(result.is_err());
    }
}
