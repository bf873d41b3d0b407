//! Run configuration.

use crate::errors::FleetflowError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Settings for one engine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum number of repositories with a step in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Start the confirmation session in auto-accept mode.
    #[serde(default)]
    pub assume_yes: bool,
    /// Report mutating actions as skipped instead of performing them.
    #[serde(default)]
    pub dry_run: bool,
    /// Git executable.
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
    /// Platform CLI executable used for pull requests.
    #[serde(default = "default_platform_binary")]
    pub platform_binary: String,
    /// Remote used for pushes and tracking lookups.
    #[serde(default = "default_remote")]
    pub remote: String,
    /// Runtime variables for plan substitution and templates.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Per-step time limit in seconds.
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
    /// Maximum directory depth scanned during discovery.
    #[serde(default = "default_discovery_depth")]
    pub discovery_depth: usize,
}

fn default_concurrency() -> usize {
    1
}

fn default_git_binary() -> String {
    "git".to_string()
}

fn default_platform_binary() -> String {
    "gh".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_discovery_depth() -> usize {
    4
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            assume_yes: false,
            dry_run: false,
            git_binary: default_git_binary(),
            platform_binary: default_platform_binary(),
            remote: default_remote(),
            vars: BTreeMap::new(),
            step_timeout_secs: None,
            discovery_depth: default_discovery_depth(),
        }
    }
}

impl RunConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a YAML configuration document.
    pub fn from_yaml_str(source: &str) -> Result<Self, FleetflowError> {
        let config: Self = serde_yaml::from_str(source)?;
        Ok(config)
    }

    /// Sets the worker pool size. Zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the assume-yes flag.
    #[must_use]
    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    /// Enables dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the remote name.
    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Adds a runtime variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Sets the per-step time limit.
    #[must_use]
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    /// Effective pool size (never zero).
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Per-step time limit as a duration.
    #[must_use]
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}
