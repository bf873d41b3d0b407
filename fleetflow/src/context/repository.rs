//! Repository context.

use crate::exec::Git;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One discovered repository.
///
/// Built once per repository before the run starts and never mutated by the
/// engine afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryContext {
    /// Absolute path of the worktree root.
    pub path: PathBuf,
    /// Owner (organisation or user) parsed from the remote URL.
    pub owner: Option<String>,
    /// Repository name.
    pub name: String,
    /// Default branch.
    pub default_branch: String,
    /// Whether the worktree was clean when the run started.
    pub clean_at_start: bool,
    /// Free-form template fields.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl RepositoryContext {
    /// Creates a context from a path, using the directory name as the repository name.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            owner: None,
            name,
            default_branch: "main".to_string(),
            clean_at_start: true,
            fields: BTreeMap::new(),
        }
    }

    /// Sets owner and name.
    #[must_use]
    pub fn with_slug(mut self, owner: impl Into<String>, name: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self.name = name.into();
        self
    }

    /// Sets the default branch.
    #[must_use]
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Sets the clean-at-start snapshot.
    #[must_use]
    pub fn with_clean_at_start(mut self, clean: bool) -> Self {
        self.clean_at_start = clean;
        self
    }

    /// Adds a template field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// `owner/name` when the owner is known, otherwise the name.
    #[must_use]
    pub fn slug(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{owner}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Value exposed to templates as `repo`.
    #[must_use]
    pub fn template_value(&self) -> serde_json::Value {
        serde_json::json!({
            "path": self.path.display().to_string(),
            "owner": self.owner,
            "name": self.name,
            "slug": self.slug(),
            "default_branch": self.default_branch,
            "fields": self.fields,
        })
    }

    /// Resolves a context by asking git about the repository.
    ///
    /// Lookups that fail fall back to defaults; resolution never aborts the run.
    pub async fn resolve(path: &Path, git: &Git, remote: &str) -> Self {
        let mut context = Self::new(path);

        match git.remote_url(path, remote).await {
            Ok(Some(url)) => {
                if let Some((owner, name)) = parse_remote_slug(&url) {
                    context = context.with_slug(owner, name);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(repo = %path.display(), error = %e, "Could not read remote URL"),
        }

        if let Some(branch) = git.default_branch(path, remote).await {
            context.default_branch = branch;
        }

        context.clean_at_start = match git.status(path).await {
            Ok(dirty) => dirty.is_empty(),
            Err(e) => {
                warn!(repo = %path.display(), error = %e, "Could not read worktree status");
                false
            }
        };

        context
    }
}

/// Extracts `(owner, name)` from a remote URL.
///
/// Handles `git@host:owner/name.git`, `ssh://git@host/owner/name.git` and
/// `https://host/owner/name(.git)`.
#[must_use]
pub fn parse_remote_slug(url: &str) -> Option<(String, String)> {
    let url = url.trim().trim_end_matches('/');
    let path = if let Some(rest) = url.split_once("://").map(|(_, rest)| rest) {
        rest.split_once('/').map(|(_, path)| path)?
    } else {
        url.split_once(':').map(|(_, path)| path)?
    };

    let path = path.strip_suffix(".git").unwrap_or(path);
    let mut parts = path.rsplitn(2, '/');
    let name = parts.next().filter(|s| !s.is_empty())?;
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let owner = owner.rsplit('/').next().unwrap_or(owner);
    Some((owner.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_slug_variants() {
        let expected = Some(("acme".to_string(), "widgets".to_string()));
        assert_eq!(parse_remote_slug("git@github.com:acme/widgets.git"), expected);
        assert_eq!(parse_remote_slug("https://github.com/acme/widgets"), expected);
        assert_eq!(parse_remote_slug("https://github.com/acme/widgets.git/"), expected);
        assert_eq!(parse_remote_slug("ssh://git@github.com/acme/widgets.git"), expected);
        assert_eq!(parse_remote_slug("not a url"), None);
    }

    #[test]
    fn test_context_defaults_and_slug() {
        let ctx = RepositoryContext::new("/src/widgets");
        assert_eq!(ctx.name, "widgets");
        assert_eq!(ctx.slug(), "widgets");
        assert_eq!(ctx.default_branch, "main");

        let ctx = ctx.with_slug("acme", "widgets");
        assert_eq!(ctx.slug(), "acme/widgets");
        assert_eq!(ctx.template_value()["owner"], "acme");
    }
}
