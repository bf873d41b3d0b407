//! Shared services and per-step contexts handed to operations.

use crate::cancellation::CancellationToken;
use crate::capture::CaptureStore;
use crate::config::RunConfig;
use crate::confirm::{ConfirmationSession, Prompter};
use crate::context::{MutationLedger, ObservedState, RepoLog, RepositoryContext};
use crate::errors::{CommandError, FleetflowError};
use crate::exec::{CommandExecutor, Git, Platform};
use crate::safeguards::{SafeguardEvaluator, Safeguards};
use crate::template::{template_context, TemplateEngine};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Everything a run shares across workers.
///
/// Only the capture store and the confirmation session are mutable; each sits
/// behind its own lock.
pub struct RunServices {
    /// Git client.
    pub git: Git,
    /// Hosting platform client.
    pub platform: Platform,
    /// Captured values for every repository.
    pub captures: CaptureStore,
    /// Confirmation session.
    pub confirmations: Arc<ConfirmationSession>,
    /// Run configuration.
    pub config: RunConfig,
    /// Template variables (plan vars overlaid with runtime vars).
    pub vars: BTreeMap<String, String>,
    /// Run-wide cancellation.
    pub cancel: Arc<CancellationToken>,
    /// Template renderer.
    pub templates: TemplateEngine,
    /// Safeguard evaluator.
    pub evaluator: SafeguardEvaluator,
}

impl RunServices {
    /// Builds services on top of an executor and a prompter.
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        prompter: Arc<dyn Prompter>,
        config: RunConfig,
    ) -> Self {
        Self {
            git: Git::new(executor.clone(), config.git_binary.clone()),
            platform: Platform::new(executor, config.platform_binary.clone()),
            captures: CaptureStore::new(),
            confirmations: Arc::new(ConfirmationSession::new(config.assume_yes, prompter)),
            vars: config.vars.clone(),
            config,
            cancel: Arc::new(CancellationToken::new()),
            templates: TemplateEngine::new(),
            evaluator: SafeguardEvaluator::new(),
        }
    }

    /// Layers plan variables under the runtime ones.
    #[must_use]
    pub fn with_plan_vars(mut self, plan_vars: &BTreeMap<String, String>) -> Self {
        for (key, value) in plan_vars {
            self.vars.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }
}

impl fmt::Debug for RunServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunServices")
            .field("git", &self.git)
            .field("config", &self.config)
            .field("vars", &self.vars)
            .finish_non_exhaustive()
    }
}

/// Context for one step against one repository.
pub struct StepContext<'a> {
    /// Shared services.
    pub services: &'a RunServices,
    /// The repository.
    pub repo: &'a RepositoryContext,
    /// Paths this run has touched in the repository.
    pub ledger: &'a mut MutationLedger,
    /// Buffered output for this (repository, step).
    pub log: &'a mut RepoLog,
    /// Step name.
    pub step: &'a str,
    /// Step-level safeguards.
    pub safeguards: &'a Safeguards,
}

impl StepContext<'_> {
    /// Repository root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.repo.path
    }

    /// Whether mutations should only be reported.
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.services.config.dry_run
    }

    /// Template context for this repository.
    #[must_use]
    pub fn template_context(&self, task: Option<&str>) -> serde_json::Value {
        template_context(self.repo, &self.services.vars, task)
    }

    /// Renders a template against this repository.
    pub fn render(&self, template: &str, task: Option<&str>) -> Result<String, FleetflowError> {
        self.services
            .templates
            .render(template, &self.template_context(task))
    }

    /// Observes the repository, ignoring paths this run already touched.
    pub async fn observe(&self) -> Result<ObservedState, CommandError> {
        ObservedState::observe(&self.services.git, self.root(), self.ledger).await
    }

    /// Asks the confirmation session; returns whether to proceed.
    ///
    /// The prompt runs on the blocking pool since it may wait on a terminal.
    pub async fn confirm(&self, prompt: impl Into<String>) -> Result<bool, FleetflowError> {
        let session = Arc::clone(&self.services.confirmations);
        let prompt = prompt.into();
        let confirmation = tokio::task::spawn_blocking(move || session.confirm(&prompt))
            .await
            .map_err(|e| FleetflowError::Prompt(e.to_string()))??;
        Ok(confirmation.confirmed)
    }
}

/// Context for a global step, run once per run.
pub struct GlobalContext<'a> {
    /// Shared services.
    pub services: &'a RunServices,
    /// Every repository in the run.
    pub repos: &'a [Arc<RepositoryContext>],
    /// Buffered output for the step.
    pub log: &'a mut RepoLog,
    /// Step name.
    pub step: &'a str,
}
