//! Hosting platform CLI (pull requests).

use super::{CommandExecutor, CommandSpec};
use crate::errors::CommandError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Parameters for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRequest {
    /// Title.
    pub title: String,
    /// Body (markdown).
    pub body: String,
    /// Base branch.
    pub base: String,
    /// Head branch.
    pub head: String,
    /// Open as draft.
    pub draft: bool,
}

/// Wrapper around the platform CLI (`gh` by default).
#[derive(Clone)]
pub struct Platform {
    executor: Arc<dyn CommandExecutor>,
    binary: String,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").field("binary", &self.binary).finish()
    }
}

impl Platform {
    /// Creates a platform client.
    pub fn new(executor: Arc<dyn CommandExecutor>, binary: impl Into<String>) -> Self {
        Self {
            executor,
            binary: binary.into(),
        }
    }

    /// Opens a pull request and returns what the CLI printed (usually the URL).
    pub async fn create_pull_request(
        &self,
        repo: &Path,
        request: &PullRequestRequest,
    ) -> Result<String, CommandError> {
        let mut args = vec![
            "pr".to_string(),
            "create".to_string(),
            "--base".to_string(),
            request.base.clone(),
            "--head".to_string(),
            request.head.clone(),
            "--title".to_string(),
            request.title.clone(),
            "--body-file".to_string(),
            "-".to_string(),
        ];
        if request.draft {
            args.push("--draft".to_string());
        }

        let spec = CommandSpec::new(self.binary.clone(), args, repo).with_stdin(request.body.clone());
        let output = self.executor.execute(&spec).await?.check(&spec)?;
        Ok(output.stdout.trim().to_string())
    }
}
