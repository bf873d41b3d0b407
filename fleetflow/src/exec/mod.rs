//! External process execution.
//!
//! Every git and platform invocation goes through [`CommandExecutor`], so the
//! engine can be driven against scripted responses in tests.

mod command;
mod git;
mod platform;

pub use command::{CommandExecutor, CommandOutput, CommandSpec, ProcessExecutor};
pub use git::{parse_porcelain, DirtyPath, Git};
pub use platform::{Platform, PullRequestRequest};

#[cfg(test)]
pub use command::MockCommandExecutor;
