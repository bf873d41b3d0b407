//! Task definitions and the task action pipeline.
//!
//! A task runs a fixed sequence of actions against one repository:
//! branch-prepare, files-apply, git-stage, git-commit, git-push and
//! pull-request-create. Each action is gated by safeguards on its own.

mod definition;
mod files;
mod pipeline;

pub use definition::{
    BranchBlock, CommitBlock, EditMode, FileEdit, PullRequestBlock, TaskAction, TaskDefinition,
};
pub use files::{append_if_missing, apply_edits, FilesReport};
pub(crate) use files::relative_path;
pub use pipeline::TaskPipeline;
