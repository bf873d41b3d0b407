//! Per-run capture store.

use crate::errors::CaptureError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// What kind of value a capture holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// A branch name.
    #[default]
    Branch,
    /// A commit id.
    Commit,
}

/// A `capture` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureSpec {
    /// Variable name.
    pub name: String,
    /// What to record.
    #[serde(default)]
    pub kind: CaptureKind,
    /// Replace an existing value instead of keeping the first one.
    #[serde(default)]
    pub overwrite: bool,
}

/// A `restore` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestoreSpec {
    /// Variable name to check out.
    pub name: String,
}

/// A value captured in one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedValue {
    /// Variable name.
    pub name: String,
    /// Kind of value.
    pub kind: CaptureKind,
    /// Branch name or commit id.
    pub value: String,
    /// Whether this value replaced an earlier one.
    pub overwritten: bool,
}

/// Result of a capture attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureWrite {
    /// The value was stored.
    Stored(CapturedValue),
    /// A value already existed and overwrite was not requested; it was kept.
    Kept(CapturedValue),
}

impl CaptureWrite {
    /// The value now held by the store.
    #[must_use]
    pub fn value(&self) -> &CapturedValue {
        match self {
            Self::Stored(v) | Self::Kept(v) => v,
        }
    }
}

/// Run-wide store of captured values, keyed by repository then name.
#[derive(Debug, Default)]
pub struct CaptureStore {
    values: Mutex<HashMap<PathBuf, HashMap<String, CapturedValue>>>,
}

impl CaptureStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value. Write-once unless `overwrite` is set.
    pub fn capture(
        &self,
        repository: &Path,
        name: &str,
        kind: CaptureKind,
        value: impl Into<String>,
        overwrite: bool,
    ) -> CaptureWrite {
        let mut values = self.values.lock();
        let repo_values = values.entry(repository.to_path_buf()).or_default();

        if let Some(existing) = repo_values.get(name) {
            if !overwrite {
                return CaptureWrite::Kept(existing.clone());
            }
        }

        let captured = CapturedValue {
            name: name.to_string(),
            kind,
            value: value.into(),
            overwritten: repo_values.contains_key(name),
        };
        repo_values.insert(name.to_string(), captured.clone());
        CaptureWrite::Stored(captured)
    }

    /// Looks up a captured value.
    pub fn get(&self, repository: &Path, name: &str) -> Result<CapturedValue, CaptureError> {
        self.values
            .lock()
            .get(repository)
            .and_then(|repo_values| repo_values.get(name))
            .cloned()
            .ok_or_else(|| CaptureError::Missing {
                name: name.to_string(),
                repository: repository.to_path_buf(),
            })
    }

    /// Number of values captured for a repository.
    #[must_use]
    pub fn len_for(&self, repository: &Path) -> usize {
        self.values.lock().get(repository).map_or(0, HashMap::len)
    }
}
