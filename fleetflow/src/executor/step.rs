//! Runs one step against one repository (or once, globally).

use crate::core::{ExecutionOutcome, OutcomeCode};
use crate::errors::{ActionError, FleetflowError};
use crate::operations::{parse_options, GlobalContext, OperationRegistry, StepContext};
use crate::safeguards::{Checkpoint, Gate};
use crate::tasks::{TaskDefinition, TaskPipeline};
use crate::workflow::{Step, TaskStepOptions, TASK_COMMAND};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, Instrument};

/// Dispatches a step to the task pipeline or to a registered operation.
///
/// Never returns an error: every failure is folded into a `failed` outcome
/// so the coordinator can keep going with other repositories.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    registry: Arc<OperationRegistry>,
    tasks: Arc<BTreeMap<String, TaskDefinition>>,
    pipeline: TaskPipeline,
    timeout: Option<Duration>,
}

impl StepExecutor {
    /// Creates an executor over a registry and the plan's tasks.
    #[must_use]
    pub fn new(
        registry: Arc<OperationRegistry>,
        tasks: Arc<BTreeMap<String, TaskDefinition>>,
    ) -> Self {
        Self {
            registry,
            tasks,
            pipeline: TaskPipeline::new(),
            timeout: None,
        }
    }

    /// Bounds the time a single step may take.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs a repository-scoped step.
    pub async fn execute(&self, step: &Step, ctx: &mut StepContext<'_>) -> ExecutionOutcome {
        let span = tracing::info_span!(
            "step",
            step = %step.name,
            command = %step.command,
            repo = %ctx.root().display(),
        );
        let limit = self.timeout;
        let run = self.dispatch(step, ctx).instrument(span);

        match limit {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => timed_out(&step.name, limit),
            },
            None => run.await,
        }
    }

    /// Runs a global step once.
    pub async fn execute_global(&self, step: &Step, ctx: &mut GlobalContext<'_>) -> ExecutionOutcome {
        let span = tracing::info_span!("global_step", step = %step.name, command = %step.command);
        let Some(operation) = self.registry.get(&step.command) else {
            return unknown_command(&step.command);
        };
        let run = async {
            match operation.run_global(ctx, &step.options).await {
                Ok(outcome) => outcome,
                Err(e) => operation_failure(&step.command, Path::new("<global>"), e),
            }
        }
        .instrument(span);

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => timed_out(&step.name, limit),
            },
            None => run.await,
        }
    }

    async fn dispatch(&self, step: &Step, ctx: &mut StepContext<'_>) -> ExecutionOutcome {
        if !ctx.safeguards.is_empty() {
            let gate = match ctx.observe().await {
                Ok(state) => ctx
                    .services
                    .evaluator
                    .evaluate(ctx.safeguards, &state, Checkpoint::Preconditions)
                    .gate(),
                Err(e) => {
                    let err = ActionError::new("safeguards", ctx.root(), e);
                    ctx.log.warn(err.to_string());
                    return ExecutionOutcome::from_error(&FleetflowError::from(err));
                }
            };
            match gate {
                Gate::Halt(reason) => {
                    ctx.log.warn(format!("{}: {reason}", step.name));
                    return ExecutionOutcome::halted(reason);
                }
                Gate::Skip(reason) => {
                    ctx.log.warn(format!("{}: {reason}", step.name));
                    return ExecutionOutcome::skipped(OutcomeCode::SafeguardSoftSkip, reason);
                }
                Gate::Proceed => {}
            }
        }

        if step.command == TASK_COMMAND {
            return self.run_task(step, ctx).await;
        }

        let Some(operation) = self.registry.get(&step.command) else {
            return unknown_command(&step.command);
        };
        debug!(operation = operation.key(), "Running operation");
        match operation.run(ctx, &step.options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let outcome = operation_failure(&step.command, ctx.root(), e);
                ctx.log.warn(outcome.reason().to_string());
                outcome
            }
        }
    }

    async fn run_task(&self, step: &Step, ctx: &mut StepContext<'_>) -> ExecutionOutcome {
        let options: TaskStepOptions = match parse_options(TASK_COMMAND, &step.options) {
            Ok(options) => options,
            Err(e) => return ExecutionOutcome::from_error(&e),
        };
        match self.tasks.get(&options.task) {
            Some(task) => self.pipeline.run(&options.task, task, ctx).await,
            None => ExecutionOutcome::failed(
                OutcomeCode::InvalidOptions,
                format!("task '{}' is not defined", options.task),
            ),
        }
    }
}

fn operation_failure(command: &str, repo: &Path, err: anyhow::Error) -> ExecutionOutcome {
    let err = match err.downcast::<FleetflowError>() {
        Ok(err) => err,
        Err(err) => FleetflowError::Operation(err),
    };
    ExecutionOutcome::from_error(&FleetflowError::from(ActionError::new(command, repo, err)))
}

fn unknown_command(command: &str) -> ExecutionOutcome {
    ExecutionOutcome::failed(
        OutcomeCode::InvalidOptions,
        format!("no operation registered for '{command}'"),
    )
}

fn timed_out(step: &str, limit: Duration) -> ExecutionOutcome {
    ExecutionOutcome::failed(
        OutcomeCode::Timeout,
        format!("step '{step}' exceeded its {}s limit", limit.as_secs()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safeguards::{Conditions, Safeguards};
    use crate::testing::fixtures::{services, StepHarness};
    use crate::testing::{
        assert_outcome_code, assert_outcome_failed, RecordingOperation, ScriptedExecutor,
    };
    use crate::context::RepoLog;
    use crate::tasks::FileEdit;

    fn executor(registry: OperationRegistry) -> StepExecutor {
        let tasks = BTreeMap::from([(
            "readme".to_string(),
            TaskDefinition {
                files: vec![FileEdit::skip_if_exists("README.md", "# {{ repo.name }}\n")],
                ..TaskDefinition::default()
            },
        )]);
        StepExecutor::new(Arc::new(registry), Arc::new(tasks))
    }

    #[tokio::test]
    async fn test_dispatches_registered_operation() {
        let op = Arc::new(RecordingOperation::new("demo.touch"));
        let mut registry = OperationRegistry::new();
        registry.register(op.clone());

        let services = services(Arc::new(ScriptedExecutor::new()));
        let mut harness = StepHarness::new("/work/widgets");
        let outcome = executor(registry)
            .execute(&Step::new("demo.touch").with_name("touch"), &mut harness.context(&services))
            .await;

        assert!(outcome.is_applied());
        assert_eq!(op.call_count(), 1);
    }

    #[tokio::test]
    async fn test_operation_error_is_folded() {
        let services = services(Arc::new(ScriptedExecutor::new()));
        let mut harness = StepHarness::new("/work/widgets");
        let step = Step::new("repo.rename").with_options(serde_json::json!({ "from": "docs" }));
        let outcome = executor(OperationRegistry::with_builtins())
            .execute(&step, &mut harness.context(&services))
            .await;

        assert_outcome_failed(&outcome);
        assert_outcome_code(&outcome, OutcomeCode::InvalidOptions);
        assert!(outcome.reason().starts_with("repo.rename failed in /work/widgets"));
    }

    #[tokio::test]
    async fn test_step_safeguard_halts() {
        let git = ScriptedExecutor::new().on("*", &["status"], " M src/lib.rs\0");
        let services = services(Arc::new(git));
        let mut harness = StepHarness::new("/work/widgets").with_safeguards(
            Safeguards::new().with_hard_stop(Conditions {
                require_clean: true,
                ..Conditions::default()
            }),
        );
        let op = Arc::new(RecordingOperation::new("demo.touch"));
        let mut registry = OperationRegistry::new();
        registry.register(op.clone());

        let outcome = executor(registry)
            .execute(&Step::new("demo.touch"), &mut harness.context(&services))
            .await;

        assert!(outcome.halts_repository());
        assert_eq!(op.call_count(), 0);
        assert!(!harness.log.lines().is_empty());
    }

    #[tokio::test]
    async fn test_step_safeguard_soft_skip() {
        let git = ScriptedExecutor::new().on("*", &["rev-parse", "--abbrev-ref", "HEAD"], "feature\n");
        let services = services(Arc::new(git));
        let mut harness = StepHarness::new("/work/widgets").with_safeguards(
            Safeguards::new().with_soft_skip(Conditions {
                branch: Some("main".into()),
                ..Conditions::default()
            }),
        );
        let outcome = executor(OperationRegistry::with_builtins())
            .execute(&Step::new("repo.rename"), &mut harness.context(&services))
            .await;

        assert_outcome_code(&outcome, OutcomeCode::SafeguardSoftSkip);
        assert!(!outcome.halts_repository());
    }

    #[tokio::test]
    async fn test_runs_task_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let services = services(Arc::new(ScriptedExecutor::new()));
        let mut harness = StepHarness::new(dir.path());
        let outcome = executor(OperationRegistry::new())
            .execute(&Step::task("readme"), &mut harness.context(&services))
            .await;

        assert!(outcome.is_applied(), "{outcome:?}");
        let written = std::fs::read_to_string(dir.path().join("README.md")).unwrap();
        assert_eq!(written, "# widgets\n");
    }

    #[tokio::test]
    async fn test_timeout() {
        let op = Arc::new(
            RecordingOperation::new("demo.slow").with_delay(Duration::from_millis(200)),
        );
        let mut registry = OperationRegistry::new();
        registry.register(op);

        let services = services(Arc::new(ScriptedExecutor::new()));
        let mut harness = StepHarness::new("/work/widgets");
        let outcome = executor(registry)
            .with_timeout(Some(Duration::from_millis(20)))
            .execute(&Step::new("demo.slow").with_name("slow"), &mut harness.context(&services))
            .await;

        assert_outcome_code(&outcome, OutcomeCode::Timeout);
    }

    #[tokio::test]
    async fn test_global_step_runs_once() {
        let op = Arc::new(RecordingOperation::global("demo.report"));
        let mut registry = OperationRegistry::new();
        registry.register(op.clone());

        let services = services(Arc::new(ScriptedExecutor::new()));
        let mut log = RepoLog::new();
        let mut ctx = GlobalContext {
            services: &services,
            repos: &[],
            log: &mut log,
            step: "report",
        };
        let outcome = executor(registry)
            .execute_global(&Step::new("demo.report"), &mut ctx)
            .await;

        assert!(outcome.is_applied());
        assert_eq!(op.calls().len(), 1);
    }
}
