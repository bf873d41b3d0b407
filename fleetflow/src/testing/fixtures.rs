//! Fixtures for services, step contexts and repository sets.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::ScriptedPrompter;
use crate::config::RunConfig;
use crate::confirm::Prompter;
use crate::context::{MutationLedger, RepoLog, RepositoryContext};
use crate::exec::CommandExecutor;
use crate::operations::{RunServices, StepContext};
use crate::safeguards::Safeguards;

/// Services with default configuration and a prompter that always declines.
#[must_use]
pub fn services(executor: Arc<dyn CommandExecutor>) -> RunServices {
    services_with(
        executor,
        RunConfig::default(),
        Arc::new(ScriptedPrompter::new(Vec::new())),
    )
}

/// Services with an explicit configuration and prompter.
#[must_use]
pub fn services_with(
    executor: Arc<dyn CommandExecutor>,
    config: RunConfig,
    prompter: Arc<dyn Prompter>,
) -> RunServices {
    RunServices::new(executor, prompter, config)
}

/// Owns everything a [`StepContext`] borrows.
#[derive(Debug)]
pub struct StepHarness {
    /// The repository.
    pub repo: RepositoryContext,
    /// Mutation ledger.
    pub ledger: MutationLedger,
    /// Buffered log.
    pub log: RepoLog,
    /// Step-level safeguards.
    pub safeguards: Safeguards,
    /// Step name.
    pub step: String,
}

impl StepHarness {
    /// Creates a harness for a repository at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            repo: RepositoryContext::new(path).with_slug("acme", "widgets"),
            ledger: MutationLedger::new(),
            log: RepoLog::new(),
            safeguards: Safeguards::new(),
            step: "test-step".to_string(),
        }
    }

    /// Sets step-level safeguards.
    #[must_use]
    pub fn with_safeguards(mut self, safeguards: Safeguards) -> Self {
        self.safeguards = safeguards;
        self
    }

    /// Borrows a step context.
    pub fn context<'a>(&'a mut self, services: &'a RunServices) -> StepContext<'a> {
        StepContext {
            services,
            repo: &self.repo,
            ledger: &mut self.ledger,
            log: &mut self.log,
            step: &self.step,
            safeguards: &self.safeguards,
        }
    }
}

/// Creates one directory per name under `root`, each with a `.git` marker.
pub fn repository_tree(root: &Path, names: &[&str]) -> std::io::Result<Vec<PathBuf>> {
    names
        .iter()
        .map(|name| {
            let path = root.join(name);
            std::fs::create_dir_all(path.join(".git"))?;
            Ok(path)
        })
        .collect()
}
