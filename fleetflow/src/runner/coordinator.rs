//! Stage-by-stage execution over a bounded worker pool.

use super::{RunSummary, StepRecord};
use crate::context::{MutationLedger, RepoLog, RepositoryContext};
use crate::core::{ExecutionOutcome, OutcomeCode};
use crate::events::{EventSink, NoOpEventSink, RunEvent};
use crate::executor::StepExecutor;
use crate::observability::run_span;
use crate::operations::{GlobalContext, OperationScope, RunServices, StepContext};
use crate::workflow::{PreparedPlan, Stage, Step};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Runs a prepared plan across repositories.
///
/// Stages are strict barriers. Within a stage every repository gets one
/// worker task that runs the stage's steps for it in declaration order, so a
/// repository never has two steps in flight. A semaphore bounds how many
/// (repository, step) invocations run at once across all workers.
pub struct RunCoordinator {
    executor: StepExecutor,
    services: Arc<RunServices>,
    sink: Arc<dyn EventSink>,
}

/// Per-repository state carried from stage to stage.
struct RepoRun {
    index: usize,
    context: Arc<RepositoryContext>,
    ledger: MutationLedger,
    halted: Option<String>,
}

/// What a stage worker hands back at the barrier.
struct StageWork {
    run: RepoRun,
    records: Vec<StepRecord>,
}

impl RunCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(executor: StepExecutor, services: Arc<RunServices>) -> Self {
        Self {
            executor,
            services,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Runs every stage and returns the summary. Never fails: failures are
    /// recorded per (repository, step).
    pub async fn run(&self, plan: &PreparedPlan, repos: &[Arc<RepositoryContext>]) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = run_span(&run_id, &plan.name);
        self.run_stages(run_id, plan, repos).instrument(span).await
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        plan: &PreparedPlan,
        repos: &[Arc<RepositoryContext>],
    ) -> RunSummary {
        let start = Instant::now();
        let concurrency = self.services.config.effective_concurrency();
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut summary = RunSummary::new(run_id);
        let mut runs: Vec<RepoRun> = repos
            .iter()
            .enumerate()
            .map(|(index, context)| RepoRun {
                index,
                context: Arc::clone(context),
                ledger: MutationLedger::new(),
                halted: None,
            })
            .collect();

        info!(
            stages = plan.stages.len(),
            repositories = repos.len(),
            concurrency,
            "Starting run"
        );

        for stage in &plan.stages {
            let mut repo_steps = Vec::new();
            for name in &stage.steps {
                let Some(step) = plan.step(name) else {
                    error!(step = %name, "Scheduled step missing from plan");
                    continue;
                };
                match plan.scope(name) {
                    OperationScope::Global => {
                        let record = self.run_global(run_id, stage, step, repos).await;
                        summary.record(record);
                    }
                    OperationScope::Repository => repo_steps.push(Arc::clone(step)),
                }
            }

            if repo_steps.is_empty() || runs.is_empty() {
                continue;
            }

            let repo_steps: Arc<[Arc<Step>]> = repo_steps.into();
            let (next_runs, mut records) = self
                .run_stage(run_id, stage.index, &repo_steps, std::mem::take(&mut runs), &permits)
                .await;
            runs = next_runs;

            let order = |r: &StepRecord| {
                let repo = repos
                    .iter()
                    .position(|c| Some(c.path.as_path()) == r.repository.as_deref())
                    .unwrap_or(usize::MAX);
                let step = repo_steps
                    .iter()
                    .position(|s| s.name == r.step)
                    .unwrap_or(usize::MAX);
                (repo, step)
            };
            records.sort_by_key(order);
            for record in records {
                summary.record(record);
            }
            debug!(stage = stage.index, "Stage barrier reached");
        }

        summary.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Run complete"
        );
        self.sink.emit(&RunEvent::run_summary(summary.clone())).await;
        summary
    }

    async fn run_global(
        &self,
        run_id: Uuid,
        stage: &Stage,
        step: &Step,
        repos: &[Arc<RepositoryContext>],
    ) -> StepRecord {
        let mut log = RepoLog::new();
        let outcome = if let Some(reason) = self.services.cancel.reason() {
            cancelled(&reason)
        } else {
            let mut ctx = GlobalContext {
                services: &self.services,
                repos,
                log: &mut log,
                step: &step.name,
            };
            self.executor.execute_global(step, &mut ctx).await
        };

        let record = StepRecord {
            repository: None,
            step: step.name.clone(),
            stage: stage.index,
            outcome: outcome.with_reason_fallback(),
        };
        self.sink
            .emit(&RunEvent::step_outcome(run_id, record.clone(), log.take()))
            .await;
        record
    }

    async fn run_stage(
        &self,
        run_id: Uuid,
        stage: usize,
        steps: &Arc<[Arc<Step>]>,
        runs: Vec<RepoRun>,
        permits: &Arc<Semaphore>,
    ) -> (Vec<RepoRun>, Vec<StepRecord>) {
        let mut workers = FuturesUnordered::new();

        for run in runs {
            let fallback = (run.index, Arc::clone(&run.context));
            let worker = StageWorker {
                run_id,
                stage,
                steps: Arc::clone(steps),
                executor: self.executor.clone(),
                services: Arc::clone(&self.services),
                sink: Arc::clone(&self.sink),
                permits: Arc::clone(permits),
            };
            let span = tracing::info_span!("repo", repo = %run.context.path.display());
            let handle = tokio::spawn(worker.run(run).instrument(span));
            workers.push(async move { (fallback, handle.await) });
        }

        let mut next_runs = Vec::new();
        let mut records = Vec::new();
        while let Some(((index, context), joined)) = workers.next().await {
            match joined {
                Ok(work) => {
                    next_runs.push(work.run);
                    records.extend(work.records);
                }
                Err(e) => {
                    error!(repo = %context.path.display(), error = %e, "Stage worker aborted");
                    let reason = format!("worker aborted: {e}");
                    for step in steps.iter() {
                        records.push(StepRecord {
                            repository: Some(context.path.clone()),
                            step: step.name.clone(),
                            stage,
                            outcome: ExecutionOutcome::failed(OutcomeCode::ActionFailed, reason.clone()),
                        });
                    }
                    // The ledger was lost with the worker; the repository is
                    // halted, so nothing stages from it again.
                    next_runs.push(RepoRun {
                        index,
                        context,
                        ledger: MutationLedger::new(),
                        halted: Some(reason),
                    });
                }
            }
        }

        next_runs.sort_by_key(|run| run.index);
        (next_runs, records)
    }
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("executor", &self.executor)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

/// Owned inputs of one repository's share of a stage.
struct StageWorker {
    run_id: Uuid,
    stage: usize,
    steps: Arc<[Arc<Step>]>,
    executor: StepExecutor,
    services: Arc<RunServices>,
    sink: Arc<dyn EventSink>,
    permits: Arc<Semaphore>,
}

impl StageWorker {
    async fn run(self, mut run: RepoRun) -> StageWork {
        let mut records = Vec::with_capacity(self.steps.len());
        for step in self.steps.iter() {
            let mut log = RepoLog::new();
            let outcome = self.run_step(step, &mut run, &mut log).await;
            if outcome.halts_repository() && run.halted.is_none() {
                warn!(step = %step.name, reason = outcome.reason(), "Repository halted");
                run.halted = Some(outcome.reason().to_string());
            }

            let record = StepRecord {
                repository: Some(run.context.path.clone()),
                step: step.name.clone(),
                stage: self.stage,
                outcome: outcome.with_reason_fallback(),
            };
            self.sink
                .emit(&RunEvent::step_outcome(self.run_id, record.clone(), log.take()))
                .await;
            records.push(record);
        }
        StageWork { run, records }
    }

    async fn run_step(&self, step: &Step, run: &mut RepoRun, log: &mut RepoLog) -> ExecutionOutcome {
        if let Some(reason) = &run.halted {
            return ExecutionOutcome::skipped(
                OutcomeCode::RepositoryHalted,
                format!("halted by an earlier hard-stop: {reason}"),
            );
        }
        if let Some(reason) = self.services.cancel.reason() {
            return cancelled(&reason);
        }

        let cancel = &self.services.cancel;
        let permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => permit,
            () = cancel.cancelled() => {
                return cancelled(&cancel.reason().unwrap_or_default());
            }
        };
        let Ok(_permit) = permit else {
            return cancelled("worker pool closed");
        };
        if let Some(reason) = self.services.cancel.reason() {
            return cancelled(&reason);
        }

        let mut ctx = StepContext {
            services: &self.services,
            repo: &run.context,
            ledger: &mut run.ledger,
            log,
            step: &step.name,
            safeguards: &step.safeguards,
        };
        self.executor.execute(step, &mut ctx).await
    }
}

fn cancelled(reason: &str) -> ExecutionOutcome {
    ExecutionOutcome::skipped(OutcomeCode::Cancelled, format!("run cancelled: {reason}"))
}

