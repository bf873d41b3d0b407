//! Engine entry point.

use crate::cancellation::CancellationToken;
use crate::config::RunConfig;
use crate::confirm::{Prompter, StdinPrompter};
use crate::context::RepositoryContext;
use crate::discovery::{FsDiscovery, RepositoryDiscovery};
use crate::errors::{FleetflowError, RunError};
use crate::events::{EventSink, NoOpEventSink};
use crate::exec::{CommandExecutor, ProcessExecutor};
use crate::executor::StepExecutor;
use crate::operations::{Operation, OperationRegistry, RunServices};
use crate::runner::{RunCoordinator, RunSummary};
use crate::workflow::{PreparedPlan, WorkflowPlan};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Runs workflow plans across a fleet of repositories.
///
/// ```rust,ignore
/// let engine = Engine::new(RunConfig::new().with_concurrency(4))
///     .with_sink(Arc::new(JsonLinesEventSink::stdout()));
/// let plan = WorkflowPlan::from_preset("rename-docs", &engine.config().vars)?;
/// let summary = engine.run(plan, &[PathBuf::from("~/src")]).await?;
/// ```
pub struct Engine {
    config: RunConfig,
    registry: OperationRegistry,
    executor: Arc<dyn CommandExecutor>,
    prompter: Arc<dyn Prompter>,
    discovery: Arc<dyn RepositoryDiscovery>,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl Engine {
    /// Creates an engine with the built-in operations, real processes and a
    /// stdin prompter.
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        let discovery = FsDiscovery::new(config.discovery_depth);
        Self {
            config,
            registry: OperationRegistry::with_builtins(),
            executor: Arc::new(ProcessExecutor::new()),
            prompter: Arc::new(StdinPrompter),
            discovery: Arc::new(discovery),
            sink: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Replaces the command executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replaces the prompter.
    #[must_use]
    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Replaces repository discovery.
    #[must_use]
    pub fn with_discovery(mut self, discovery: Arc<dyn RepositoryDiscovery>) -> Self {
        self.discovery = discovery;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Registers an extra operation.
    #[must_use]
    pub fn with_operation(mut self, operation: Arc<dyn Operation>) -> Self {
        self.registry.register(operation);
        self
    }

    /// Run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Token that cancels the current and future runs of this engine.
    #[must_use]
    pub fn cancellation(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancel)
    }

    /// Validates and schedules a plan without touching any repository.
    pub fn prepare(&self, plan: WorkflowPlan) -> Result<PreparedPlan, FleetflowError> {
        Ok(plan.prepare(&self.registry)?)
    }

    /// Discovers repositories under `roots` and runs the plan on them.
    pub async fn run(&self, plan: WorkflowPlan, roots: &[PathBuf]) -> Result<RunSummary, FleetflowError> {
        let prepared = self.prepare(plan)?;
        let paths = self.discovery.discover(roots).await?;
        info!(repositories = paths.len(), "Discovered repositories");
        self.run_prepared(&prepared, &paths).await
    }

    /// Runs the plan on an explicit list of repositories.
    pub async fn run_repositories(
        &self,
        plan: WorkflowPlan,
        paths: &[PathBuf],
    ) -> Result<RunSummary, FleetflowError> {
        let prepared = self.prepare(plan)?;
        self.run_prepared(&prepared, paths).await
    }

    /// Runs an already prepared plan.
    ///
    /// Returns [`FleetflowError::Run`] carrying the summary when any
    /// (repository, step) failed.
    pub async fn run_prepared(
        &self,
        plan: &PreparedPlan,
        paths: &[PathBuf],
    ) -> Result<RunSummary, FleetflowError> {
        let services = Arc::new(
            RunServices::new(
                Arc::clone(&self.executor),
                Arc::clone(&self.prompter),
                self.config.clone(),
            )
            .with_plan_vars(&plan.vars)
            .with_cancellation(Arc::clone(&self.cancel)),
        );

        let repos = self.resolve(&services, paths).await;
        let executor = StepExecutor::new(Arc::new(self.registry.clone()), Arc::clone(&plan.tasks))
            .with_timeout(self.config.step_timeout());
        let summary = RunCoordinator::new(executor, services)
            .with_sink(Arc::clone(&self.sink))
            .run(plan, &repos)
            .await;

        if summary.has_failures() {
            return Err(FleetflowError::Run(Box::new(RunError::new(summary))));
        }
        Ok(summary)
    }

    async fn resolve(&self, services: &RunServices, paths: &[PathBuf]) -> Vec<Arc<RepositoryContext>> {
        let remote = services.config.remote.as_str();
        stream::iter(paths)
            .map(|path| async move { Arc::new(RepositoryContext::resolve(path, &services.git, remote).await) })
            .buffered(self.config.effective_concurrency())
            .collect()
            .await
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
