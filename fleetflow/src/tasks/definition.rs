//! Task definition types.

use crate::capture::{CaptureSpec, RestoreSpec};
use crate::safeguards::Safeguards;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One discrete action of the task pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskAction {
    /// Create or switch to the task branch.
    #[serde(rename = "branch-prepare", alias = "branch")]
    BranchPrepare,
    /// Apply file edits.
    #[serde(rename = "files-apply", alias = "files")]
    FilesApply,
    /// Stage the paths this run touched.
    #[serde(rename = "git-stage", alias = "stage")]
    GitStage,
    /// Commit staged changes.
    #[serde(rename = "git-commit", alias = "commit")]
    GitCommit,
    /// Push the prepared branch.
    #[serde(rename = "git-push", alias = "push")]
    GitPush,
    /// Open a pull request.
    #[serde(rename = "pull-request-create", alias = "pull-request", alias = "pr")]
    PullRequestCreate,
}

impl TaskAction {
    /// The default pipeline, in execution order.
    pub const ALL: [Self; 6] = [
        Self::BranchPrepare,
        Self::FilesApply,
        Self::GitStage,
        Self::GitCommit,
        Self::GitPush,
        Self::PullRequestCreate,
    ];

    /// Canonical name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BranchPrepare => "branch-prepare",
            Self::FilesApply => "files-apply",
            Self::GitStage => "git-stage",
            Self::GitCommit => "git-commit",
            Self::GitPush => "git-push",
            Self::PullRequestCreate => "pull-request-create",
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Branch to work on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchBlock {
    /// Branch name template.
    pub name: String,
    /// Start point template for a new branch.
    #[serde(default)]
    pub start_point: Option<String>,
    /// Create the branch when it does not exist.
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
}

fn default_true() -> bool {
    true
}

/// How a file edit is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    /// Replace the whole file.
    #[default]
    Overwrite,
    /// Write only when the file does not exist.
    SkipIfExists,
    /// Append each template line the file lacks, leaving existing content alone.
    AppendIfMissing,
    /// Replace text in every file matched by `path` or `glob`.
    Replace,
}

/// One file edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEdit {
    /// Target path (templated), relative to the repository root.
    #[serde(default)]
    pub path: Option<String>,
    /// Glob (supports `**`) selecting targets for `replace`.
    #[serde(default)]
    pub glob: Option<String>,
    /// Edit mode.
    #[serde(default)]
    pub mode: EditMode,
    /// Content template for overwrite/skip_if_exists/append_if_missing.
    #[serde(default)]
    pub content: Option<String>,
    /// Text (or regex with `regex: true`) to find for `replace`.
    #[serde(default)]
    pub find: Option<String>,
    /// Replacement template for `replace`.
    #[serde(default)]
    pub replace: Option<String>,
    /// Treat `find` as a regular expression.
    #[serde(default)]
    pub regex: bool,
}

impl FileEdit {
    /// An overwrite edit.
    pub fn overwrite(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_content(path, EditMode::Overwrite, content)
    }

    /// A skip-if-exists edit.
    pub fn skip_if_exists(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_content(path, EditMode::SkipIfExists, content)
    }

    /// An append-if-missing edit.
    pub fn append_if_missing(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_content(path, EditMode::AppendIfMissing, content)
    }

    /// A glob-scoped literal replacement.
    pub fn replace_in(glob: impl Into<String>, find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            path: None,
            glob: Some(glob.into()),
            mode: EditMode::Replace,
            content: None,
            find: Some(find.into()),
            replace: Some(replace.into()),
            regex: false,
        }
    }

    fn with_content(path: impl Into<String>, mode: EditMode, content: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            glob: None,
            mode,
            content: Some(content.into()),
            find: None,
            replace: None,
            regex: false,
        }
    }
}

/// Commit settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitBlock {
    /// Message template.
    pub message: String,
}

/// Pull request settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullRequestBlock {
    /// Title template.
    pub title: String,
    /// Body template.
    #[serde(default)]
    pub body: String,
    /// Base branch template; defaults to the repository's default branch.
    #[serde(default)]
    pub base: Option<String>,
    /// Open as draft.
    #[serde(default)]
    pub draft: bool,
}

/// A named unit of repository work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDefinition {
    /// Branch to prepare.
    #[serde(default)]
    pub branch: Option<BranchBlock>,
    /// File edits, applied in order.
    #[serde(default)]
    pub files: Vec<FileEdit>,
    /// Safeguards gating every action.
    #[serde(default)]
    pub safeguards: Safeguards,
    /// Value to capture before anything changes.
    #[serde(default)]
    pub capture: Option<CaptureSpec>,
    /// Previously captured value to check out first.
    #[serde(default)]
    pub restore: Option<RestoreSpec>,
    /// Allow-list of actions; absent means the full pipeline.
    #[serde(default)]
    pub steps: Option<Vec<TaskAction>>,
    /// Extra paths (templated) to stage besides the ledger.
    #[serde(default)]
    pub stage_paths: Vec<String>,
    /// Commit settings.
    #[serde(default)]
    pub commit: Option<CommitBlock>,
    /// Pull request settings.
    #[serde(default)]
    pub pull_request: Option<PullRequestBlock>,
    /// Ask before pushing and opening pull requests.
    #[serde(default)]
    pub confirm: bool,
}

impl TaskDefinition {
    /// Actions to run, in pipeline order.
    #[must_use]
    pub fn actions(&self) -> Vec<TaskAction> {
        match &self.steps {
            Some(allowed) => TaskAction::ALL
                .into_iter()
                .filter(|action| allowed.contains(action))
                .collect(),
            None => TaskAction::ALL.to_vec(),
        }
    }

    /// Whether the given action is part of this task's run.
    #[must_use]
    pub fn runs(&self, action: TaskAction) -> bool {
        self.steps.as_ref().map_or(true, |allowed| allowed.contains(&action))
    }
}
