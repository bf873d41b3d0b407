//! Observed worktree state.

use super::MutationLedger;
use crate::errors::CommandError;
use crate::exec::{DirtyPath, Git};
use std::path::{Path, PathBuf};

/// What the engine sees in a repository right before an action runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    /// Worktree root.
    pub root: PathBuf,
    /// Current branch (`None` when detached).
    pub branch: Option<String>,
    /// Dirty paths not produced by this run.
    pub dirty: Vec<DirtyPath>,
    /// Whether anything is staged, when the caller checked.
    pub has_staged_changes: Option<bool>,
}

impl ObservedState {
    /// Creates a clean state for the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Sets the current branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Adds a dirty path.
    #[must_use]
    pub fn with_dirty(mut self, path: impl Into<PathBuf>, untracked: bool) -> Self {
        self.dirty.push(DirtyPath {
            path: path.into(),
            untracked,
        });
        self
    }

    /// Sets the staged-changes fact.
    #[must_use]
    pub fn with_staged_changes(mut self, staged: bool) -> Self {
        self.has_staged_changes = Some(staged);
        self
    }

    /// Whether a repository-relative path exists.
    #[must_use]
    pub fn path_exists(&self, relative: &str) -> bool {
        self.root.join(relative).exists()
    }

    /// Looks at the repository through git, ignoring paths the run itself touched.
    pub async fn observe(
        git: &Git,
        root: &Path,
        ledger: &MutationLedger,
    ) -> Result<Self, CommandError> {
        let branch = git.current_branch(root).await?;
        let dirty = git
            .status(root)
            .await?
            .into_iter()
            .filter(|entry| !ledger.covers(&entry.path))
            .collect();

        Ok(Self {
            root: root.to_path_buf(),
            branch,
            dirty,
            has_staged_changes: None,
        })
    }
}
