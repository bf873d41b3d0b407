//! Git command runner.

use super::{CommandExecutor, CommandOutput, CommandSpec};
use crate::errors::CommandError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A path reported by `git status`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirtyPath {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// True for untracked files.
    pub untracked: bool,
}

/// Thin async wrapper around the git CLI.
#[derive(Clone)]
pub struct Git {
    executor: Arc<dyn CommandExecutor>,
    binary: String,
}

impl fmt::Debug for Git {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Git").field("binary", &self.binary).finish()
    }
}

impl Git {
    /// Creates a git runner using the given binary.
    pub fn new(executor: Arc<dyn CommandExecutor>, binary: impl Into<String>) -> Self {
        Self {
            executor,
            binary: binary.into(),
        }
    }

    fn spec(&self, repo: &Path, args: &[&str]) -> CommandSpec {
        CommandSpec::new(self.binary.clone(), args.iter().copied(), repo)
    }

    /// Runs git and returns the raw output, whatever the exit code.
    pub async fn run(&self, repo: &Path, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.executor.execute(&self.spec(repo, args)).await
    }

    /// Runs git, fails on non-zero exit, returns trimmed stdout.
    pub async fn run_checked(&self, repo: &Path, args: &[&str]) -> Result<String, CommandError> {
        let spec = self.spec(repo, args);
        let output = self.executor.execute(&spec).await?.check(&spec)?;
        Ok(output.stdout.trim().to_string())
    }

    /// Runs git and reports whether it exited with zero.
    pub async fn run_bool(&self, repo: &Path, args: &[&str]) -> bool {
        self.run(repo, args)
            .await
            .map(|output| output.success())
            .unwrap_or(false)
    }

    /// Current branch, or `None` on a detached HEAD.
    pub async fn current_branch(&self, repo: &Path) -> Result<Option<String>, CommandError> {
        let branch = self
            .run_checked(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(match branch.as_str() {
            "" | "HEAD" => None,
            _ => Some(branch),
        })
    }

    /// Commit id of HEAD.
    pub async fn head_commit(&self, repo: &Path) -> Result<String, CommandError> {
        self.run_checked(repo, &["rev-parse", "HEAD"]).await
    }

    /// Uncommitted and untracked paths.
    pub async fn status(&self, repo: &Path) -> Result<Vec<DirtyPath>, CommandError> {
        let spec = self.spec(repo, &["status", "--porcelain=v1", "-z", "--untracked-files=all"]);
        let output = self.executor.execute(&spec).await?.check(&spec)?;
        Ok(parse_porcelain(&output.stdout))
    }

    /// Whether a local branch exists.
    pub async fn branch_exists(&self, repo: &Path, branch: &str) -> bool {
        let reference = format!("refs/heads/{branch}");
        self.run_bool(repo, &["rev-parse", "--verify", "--quiet", &reference])
            .await
    }

    /// Whether a remote-tracking branch exists.
    pub async fn remote_branch_exists(&self, repo: &Path, remote: &str, branch: &str) -> bool {
        let reference = format!("refs/remotes/{remote}/{branch}");
        self.run_bool(repo, &["rev-parse", "--verify", "--quiet", &reference])
            .await
    }

    /// Checks out a branch or commit.
    pub async fn checkout(&self, repo: &Path, target: &str) -> Result<(), CommandError> {
        self.run_checked(repo, &["checkout", target]).await.map(drop)
    }

    /// Creates and checks out a new branch.
    pub async fn create_branch(
        &self,
        repo: &Path,
        branch: &str,
        start_point: Option<&str>,
    ) -> Result<(), CommandError> {
        let mut args = vec!["checkout", "-b", branch];
        if let Some(start) = start_point {
            args.push(start);
        }
        self.run_checked(repo, &args).await.map(drop)
    }

    /// Sets the upstream of a local branch.
    pub async fn set_upstream(
        &self,
        repo: &Path,
        remote: &str,
        branch: &str,
    ) -> Result<(), CommandError> {
        let upstream = format!("{remote}/{branch}");
        self.run_checked(repo, &["branch", "--set-upstream-to", &upstream, branch])
            .await
            .map(drop)
    }

    /// Stages exactly the given paths.
    pub async fn add(&self, repo: &Path, paths: &[PathBuf]) -> Result<(), CommandError> {
        let rendered: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let mut args = vec!["add", "--all", "--"];
        args.extend(rendered.iter().map(String::as_str));
        self.run_checked(repo, &args).await.map(drop)
    }

    /// Whether anything is staged.
    pub async fn has_staged_changes(&self, repo: &Path) -> Result<bool, CommandError> {
        let spec = self.spec(repo, &["diff", "--cached", "--quiet"]);
        let output = self.executor.execute(&spec).await?;
        match output.exit_code {
            0 => Ok(false),
            1 => Ok(true),
            _ => output.check(&spec).map(|_| false),
        }
    }

    /// Commits staged changes, passing the message on stdin.
    pub async fn commit(&self, repo: &Path, message: &str) -> Result<(), CommandError> {
        let spec = self.spec(repo, &["commit", "--file", "-"]).with_stdin(message);
        self.executor.execute(&spec).await?.check(&spec).map(drop)
    }

    /// Configured remote names.
    pub async fn remotes(&self, repo: &Path) -> Result<Vec<String>, CommandError> {
        let stdout = self.run_checked(repo, &["remote"]).await?;
        Ok(stdout.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    }

    /// URL of a remote, if it exists.
    pub async fn remote_url(&self, repo: &Path, remote: &str) -> Result<Option<String>, CommandError> {
        let output = self.run(repo, &["remote", "get-url", remote]).await?;
        let url = output.stdout.trim();
        Ok((output.success() && !url.is_empty()).then(|| url.to_string()))
    }

    /// Rewrites the URL of a remote.
    pub async fn set_remote_url(&self, repo: &Path, remote: &str, url: &str) -> Result<(), CommandError> {
        self.run_checked(repo, &["remote", "set-url", remote, url])
            .await
            .map(drop)
    }

    /// Pushes a branch and records it as upstream.
    pub async fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<(), CommandError> {
        self.run_checked(repo, &["push", "--set-upstream", remote, branch])
            .await
            .map(drop)
    }

    /// Default branch advertised by the remote, if known locally.
    pub async fn default_branch(&self, repo: &Path, remote: &str) -> Option<String> {
        let reference = format!("refs/remotes/{remote}/HEAD");
        let output = self
            .run(repo, &["symbolic-ref", "--short", &reference])
            .await
            .ok()?;
        if !output.success() {
            return None;
        }
        let prefix = format!("{remote}/");
        let name = output.stdout.trim();
        let name = name.strip_prefix(&prefix).unwrap_or(name);
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// Parses `git status --porcelain=v1 -z` output.
///
/// Entries are NUL-terminated and paths are verbatim. Renames and copies
/// carry their source path as an extra entry, which is dropped so only the
/// destination is reported.
pub fn parse_porcelain(output: &str) -> Vec<DirtyPath> {
    let mut dirty = Vec::new();
    let mut entries = output
        .split('\0')
        .filter(|entry| !entry.is_empty());
    while let Some(entry) = entries.next() {
        let (Some(code), Some(path)) = (entry.get(..2), entry.get(3..)) else {
            continue;
        };
        if code.contains(['R', 'C']) {
            entries.next();
        }
        if path.is_empty() {
            continue;
        }
        dirty.push(DirtyPath {
            path: PathBuf::from(path),
            untracked: code == "??",
        });
    }
    dirty
}
