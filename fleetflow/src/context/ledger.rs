//! Mutation ledger.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Paths touched in one repository during one run.
///
/// Staging consults the ledger so that only the run's own edits are committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationLedger {
    paths: BTreeSet<PathBuf>,
}

impl MutationLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a path relative to the repository root.
    pub fn record(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    /// Returns true if the path, or a directory containing it, was recorded.
    #[must_use]
    pub fn covers(&self, path: &Path) -> bool {
        self.paths.iter().any(|recorded| path.starts_with(recorded))
    }

    /// Recorded paths in sorted order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.iter().cloned().collect()
    }

    /// Number of recorded paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_covers() {
        let mut ledger = MutationLedger::new();
        ledger.record("docs");
        ledger.record(".gitignore");
        ledger.record(".gitignore");

        assert_eq!(ledger.len(), 2);
        assert!(ledger.covers(Path::new("docs/intro.md")));
        assert!(ledger.covers(Path::new(".gitignore")));
        assert!(!ledger.covers(Path::new(".gitignore.bak")));
        assert!(!ledger.covers(Path::new("src/lib.rs")));
    }
}
