//! Per-repository context.
//!
//! This module provides:
//! - `RepositoryContext`, the immutable facts about one discovered repository
//! - `MutationLedger`, the paths a run has touched in a repository
//! - `ObservedState`, a fresh look at the worktree for safeguard evaluation
//! - `RepoLog`, the buffered log section for one (repository, step)

mod ledger;
mod log;
mod repository;
mod state;

pub use ledger::MutationLedger;
pub use log::{LogLevel, LogLine, RepoLog};
pub use repository::{parse_remote_slug, RepositoryContext};
pub use state::ObservedState;
