//! End-to-end runs through the engine.

#[cfg(test)]
mod tests {
    use crate::config::RunConfig;
    use crate::core::{ExecutionOutcome, OutcomeCode, OutcomeStatus};
    use crate::errors::FleetflowError;
    use crate::events::{CollectingEventSink, RunEvent};
    use crate::exec::{CommandExecutor, CommandOutput};
    use crate::operations::{Operation, StepContext};
    use crate::runner::RunSummary;
    use crate::safeguards::{Conditions, Safeguards};
    use crate::testing::fixtures::repository_tree;
    use crate::testing::{RecordingOperation, ScriptedExecutor};
    use crate::workflow::{Step, WorkflowPlan};
    use crate::Engine;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(config: RunConfig, executor: &Arc<ScriptedExecutor>) -> Engine {
        let executor: Arc<dyn CommandExecutor> = executor.clone();
        Engine::new(config).with_executor(executor)
    }

    fn cwd(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    fn codes(summary: &RunSummary, repo: &Path) -> Vec<OutcomeCode> {
        summary.for_repository(repo).map(|r| r.outcome.code).collect()
    }

    fn rename_plan() -> WorkflowPlan {
        let guard = Safeguards::new().with_hard_stop(Conditions {
            require_clean: true,
            ..Conditions::default()
        });
        WorkflowPlan::new("rename-docs")
            .with_step(
                Step::new("repo.rename")
                    .with_name("rename")
                    .with_safeguards(guard)
                    .with_options(serde_json::json!({ "from": "docs", "to": "documentation" })),
            )
            .with_step(
                Step::new("git.stage-commit")
                    .with_name("commit")
                    .with_options(serde_json::json!({ "message": "chore: rename docs" })),
            )
    }

    fn fleet(root: &Path) -> Vec<PathBuf> {
        let repos = repository_tree(root, &["alpha", "bravo", "charlie"]).unwrap();
        for repo in &repos {
            std::fs::create_dir_all(repo.join("docs")).unwrap();
            std::fs::write(repo.join("docs/index.md"), "# Docs\n").unwrap();
        }
        repos
    }

    #[tokio::test]
    async fn test_rename_and_commit_across_fleet() {
        let dir = tempfile::tempdir().unwrap();
        let repos = fleet(dir.path());
        let dirty = &repos[1];
        let git = Arc::new(
            ScriptedExecutor::new()
                .on(cwd(dirty), &["status"], " M README.md\0")
                .on_output("*", &["diff", "--cached", "--quiet"], CommandOutput::failure(1, "")),
        );

        let summary = engine(RunConfig::default(), &git)
            .run_repositories(rename_plan(), &repos)
            .await
            .unwrap();

        assert_eq!((summary.applied, summary.skipped, summary.failed), (4, 2, 0));
        assert_eq!(
            codes(&summary, dirty),
            vec![OutcomeCode::SafeguardHardStop, OutcomeCode::RepositoryHalted]
        );
        assert!(dirty.join("docs").exists());
        assert!(!dirty.join("documentation").exists());

        for clean in [&repos[0], &repos[2]] {
            assert!(clean.join("documentation/index.md").exists());
            assert!(git.was_called(clean, &["add", "--all", "--", "docs", "documentation"]));
            assert!(git.was_called(clean, &["commit", "--file", "-"]));
        }
        assert!(git.calls_in(dirty).iter().all(|c| c.args[0] != "commit"));
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let repos = fleet(dir.path());
        let git = Arc::new(ScriptedExecutor::new());

        let summary = engine(RunConfig::default().with_dry_run(true), &git)
            .run_repositories(rename_plan(), &repos)
            .await
            .unwrap();

        assert_eq!(summary.count_code(OutcomeCode::DryRun), 3);
        assert_eq!(summary.count_code(OutcomeCode::NoChanges), 3);
        for repo in &repos {
            assert!(repo.join("docs/index.md").exists());
        }
        assert!(git.calls_matching(&["add"]).is_empty());
        assert!(git.calls_matching(&["commit"]).is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["r1", "r2", "r3", "r4", "r5", "r6"];
        let repos = repository_tree(dir.path(), &names).unwrap();

        for (concurrency, expected) in [(1, 1), (2, 2)] {
            let op = Arc::new(RecordingOperation::new("demo.slow").with_delay(Duration::from_millis(30)));
            let git = Arc::new(ScriptedExecutor::new());
            let plan = WorkflowPlan::new("slow").with_step(Step::new("demo.slow"));

            engine(RunConfig::default().with_concurrency(concurrency), &git)
                .with_operation(op.clone())
                .run_repositories(plan, &repos)
                .await
                .unwrap();

            assert_eq!(op.call_count(), names.len());
            assert_eq!(op.max_in_flight(), expected, "concurrency {concurrency}");
        }
    }

    #[tokio::test]
    async fn test_stage_barrier_and_repository_order() {
        let dir = tempfile::tempdir().unwrap();
        let repos = repository_tree(dir.path(), &["a", "b", "c", "d"]).unwrap();
        let first = Arc::new(RecordingOperation::new("demo.first").with_delay(Duration::from_millis(10)));
        let second = Arc::new(RecordingOperation::new("demo.second"));
        let log = Arc::new(CallLog::default());
        let git = Arc::new(ScriptedExecutor::new());
        let plan = WorkflowPlan::new("barrier")
            .with_step(Step::new("demo.log").with_name("one"))
            .with_step(Step::new("demo.first").with_name("first").with_after("one"))
            .with_step(Step::new("demo.second").with_name("second").with_after("one"))
            .with_step(Step::new("demo.log").with_name("two").with_after("first").with_after("second"));

        let summary = engine(RunConfig::default().with_concurrency(4), &git)
            .with_operation(first.clone())
            .with_operation(second.clone())
            .with_operation(log.clone())
            .run_repositories(plan, &repos)
            .await
            .unwrap();

        let steps = log.steps();
        let boundary = steps.iter().position(|s| s == "two").unwrap();
        assert!(steps[..boundary].iter().all(|s| s == "one"));
        assert_eq!(steps.len(), repos.len() * 2);

        for repo in &repos {
            let names: Vec<&str> = summary.for_repository(repo).map(|r| r.step.as_str()).collect();
            assert_eq!(names, vec!["one", "first", "second", "two"]);
        }
        let stages: Vec<usize> = summary.outcomes.iter().map(|r| r.stage).collect();
        assert!(stages.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_hard_stop_skips_later_stages_only_for_that_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repos = repository_tree(dir.path(), &["a", "b"]).unwrap();
        let guard = Arc::new(
            RecordingOperation::new("demo.guard")
                .with_outcome_for(&repos[1], ExecutionOutcome::halted("protected branch")),
        );
        let after = Arc::new(RecordingOperation::new("demo.after"));
        let git = Arc::new(ScriptedExecutor::new());
        let plan = WorkflowPlan::new("halt")
            .with_step(Step::new("demo.guard"))
            .with_step(Step::new("demo.after"));

        let summary = engine(RunConfig::default(), &git)
            .with_operation(guard)
            .with_operation(after.clone())
            .run_repositories(plan, &repos)
            .await
            .unwrap();

        assert_eq!(after.calls().iter().map(|(p, _)| p.clone()).collect::<Vec<_>>(), vec![repos[0].clone()]);
        assert_eq!(
            codes(&summary, &repos[1]),
            vec![OutcomeCode::SafeguardHardStop, OutcomeCode::RepositoryHalted]
        );
        let halted = summary.for_repository(&repos[1]).nth(1).unwrap();
        assert!(halted.outcome.reason().contains("protected branch"));
    }

    #[tokio::test]
    async fn test_failure_does_not_halt_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repos = repository_tree(dir.path(), &["a", "b"]).unwrap();
        let flaky = Arc::new(RecordingOperation::new("demo.flaky").with_outcome_for(
            &repos[0],
            ExecutionOutcome::failed(OutcomeCode::CommandFailed, "exit 128"),
        ));
        let after = Arc::new(RecordingOperation::new("demo.after"));
        let git = Arc::new(ScriptedExecutor::new());
        let plan = WorkflowPlan::new("flaky")
            .with_step(Step::new("demo.flaky"))
            .with_step(Step::new("demo.after"));

        let err = engine(RunConfig::default(), &git)
            .with_operation(flaky)
            .with_operation(after.clone())
            .run_repositories(plan, &repos)
            .await
            .unwrap_err();

        let FleetflowError::Run(run) = err else {
            panic!("expected run error, got {err:?}");
        };
        assert_eq!((run.summary.applied, run.summary.failed), (3, 1));
        assert_eq!(after.call_count(), 2);
    }

    #[tokio::test]
    async fn test_aborted_worker_halts_its_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repos = repository_tree(dir.path(), &["a", "b"]).unwrap();
        let after = Arc::new(RecordingOperation::new("demo.after"));
        let git = Arc::new(ScriptedExecutor::new());
        let plan = WorkflowPlan::new("abort")
            .with_step(Step::new("demo.explode"))
            .with_step(Step::new("demo.after"));

        let err = engine(RunConfig::default(), &git)
            .with_operation(Arc::new(Explode { target: repos[0].clone() }))
            .with_operation(after.clone())
            .run_repositories(plan, &repos)
            .await
            .unwrap_err();

        let FleetflowError::Run(run) = err else {
            panic!("expected run error, got {err:?}");
        };
        assert_eq!(
            codes(&run.summary, &repos[0]),
            vec![OutcomeCode::ActionFailed, OutcomeCode::RepositoryHalted]
        );
        assert_eq!(codes(&run.summary, &repos[1]), vec![OutcomeCode::Applied, OutcomeCode::Applied]);
        assert_eq!(after.call_count(), 1);
    }

    #[tokio::test]
    async fn test_global_step_runs_once_between_stages() {
        let dir = tempfile::tempdir().unwrap();
        let repos = repository_tree(dir.path(), &["a", "b", "c"]).unwrap();
        let report = Arc::new(RecordingOperation::global("demo.report"));
        let git = Arc::new(ScriptedExecutor::new());
        let plan = WorkflowPlan::new("audit")
            .with_step(Step::new("demo.report"))
            .with_step(Step::new("audit.report"));

        let summary = engine(RunConfig::default().with_concurrency(3), &git)
            .with_operation(report.clone())
            .run_repositories(plan, &repos)
            .await
            .unwrap();

        assert_eq!(report.call_count(), 1);
        assert_eq!(summary.total, 2);
        assert!(summary.outcomes.iter().all(|r| r.repository.is_none()));
        let audit = &summary.outcomes[1].outcome;
        assert_eq!(audit.details["repositories"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_cancellation_stops_new_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let repos = repository_tree(dir.path(), &["a", "b"]).unwrap();
        let after = Arc::new(RecordingOperation::new("demo.after"));
        let git = Arc::new(ScriptedExecutor::new());
        let plan = WorkflowPlan::new("interrupt")
            .with_step(Step::new("demo.interrupt"))
            .with_step(Step::new("demo.after"));

        let summary = engine(RunConfig::default(), &git)
            .with_operation(Arc::new(Interrupt))
            .with_operation(after.clone())
            .run_repositories(plan, &repos)
            .await
            .unwrap();

        assert_eq!(after.call_count(), 0);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.count_code(OutcomeCode::Cancelled), 3);
        let last = summary.outcomes.last().unwrap();
        assert_eq!(last.outcome.code, OutcomeCode::Cancelled);
        assert!(last.outcome.reason().contains("operator interrupt"));
    }

    #[tokio::test]
    async fn test_cancellation_releases_queued_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let repos = repository_tree(dir.path(), &["a", "b"]).unwrap();
        let git = Arc::new(ScriptedExecutor::new());
        let sink = Arc::new(CollectingEventSink::new());
        let plan = WorkflowPlan::new("hold").with_step(Step::new("demo.hold"));

        let summary = engine(RunConfig::default().with_concurrency(1), &git)
            .with_operation(Arc::new(CancelAndHold::default()))
            .with_sink(sink.clone())
            .run_repositories(plan, &repos)
            .await
            .unwrap();

        assert_eq!((summary.applied, summary.count_code(OutcomeCode::Cancelled)), (1, 1));
        let codes: Vec<OutcomeCode> = sink
            .events()
            .iter()
            .filter_map(|event| match event {
                RunEvent::StepOutcome { record, .. } => Some(record.outcome.code),
                RunEvent::RunSummary { .. } => None,
            })
            .collect();
        assert_eq!(codes, vec![OutcomeCode::Cancelled, OutcomeCode::Applied]);
    }

    #[tokio::test]
    async fn test_events_never_carry_blank_reasons() {
        let dir = tempfile::tempdir().unwrap();
        let repos = repository_tree(dir.path(), &["a"]).unwrap();
        let silent = Arc::new(
            RecordingOperation::new("demo.silent")
                .with_outcome(ExecutionOutcome::failed(OutcomeCode::ActionFailed, "")),
        );
        let git = Arc::new(ScriptedExecutor::new());
        let sink = Arc::new(CollectingEventSink::new());
        let plan = WorkflowPlan::new("silent").with_step(Step::new("demo.silent"));

        let err = engine(RunConfig::default(), &git)
            .with_operation(silent)
            .with_sink(sink.clone())
            .run_repositories(plan, &repos)
            .await
            .unwrap_err();

        assert!(matches!(err, FleetflowError::Run(_)));
        let reasons: Vec<String> = sink
            .events()
            .iter()
            .filter_map(|event| match event {
                RunEvent::StepOutcome { record, .. } => Some(record.outcome.reason().to_string()),
                RunEvent::RunSummary { .. } => None,
            })
            .collect();
        assert_eq!(reasons, vec!["action_failed".to_string()]);
    }

    #[tokio::test]
    async fn test_plan_errors_touch_no_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repos = repository_tree(dir.path(), &["a"]).unwrap();
        let git = Arc::new(ScriptedExecutor::new());
        let plan = WorkflowPlan::new("cycle")
            .with_step(Step::new("repo.rename").with_name("x").with_after("y"))
            .with_step(Step::new("repo.rename").with_name("y").with_after("x"));

        let err = engine(RunConfig::default(), &git)
            .run_repositories(plan, &repos)
            .await
            .unwrap_err();

        match err {
            FleetflowError::Plan(plan) => assert_eq!(plan.code(), Some("PLAN-CYCLE")),
            other => panic!("expected plan error, got {other:?}"),
        }
        assert!(git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_one_event_per_outcome_then_summary() {
        let dir = tempfile::tempdir().unwrap();
        let repos = fleet(dir.path());
        let git = Arc::new(
            ScriptedExecutor::new()
                .on_output("*", &["diff", "--cached", "--quiet"], CommandOutput::failure(1, "")),
        );
        let sink = Arc::new(CollectingEventSink::new());

        let summary = engine(RunConfig::default().with_concurrency(3), &git)
            .with_sink(sink.clone())
            .run_repositories(rename_plan(), &repos)
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), summary.total + 1);
        assert!(matches!(events.last(), Some(RunEvent::RunSummary { .. })));
        assert!(events.iter().all(|e| e.run_id() == summary.run_id));

        let renamed = events.iter().find_map(|event| match event {
            RunEvent::StepOutcome { record, log, .. } if record.step == "rename" => Some(log.clone()),
            _ => None,
        });
        let lines = renamed.unwrap();
        assert!(lines.iter().any(|line| line.message.starts_with("renamed docs")));
    }

    #[tokio::test]
    async fn test_task_pipeline_through_engine() {
        let dir = tempfile::tempdir().unwrap();
        let repos = repository_tree(dir.path(), &["svc"]).unwrap();
        std::fs::write(repos[0].join(".gitignore"), "target/\n").unwrap();
        let git = Arc::new(
            ScriptedExecutor::new()
                .on_output("*", &["rev-parse", "--verify"], CommandOutput::failure(1, ""))
                .on_output("*", &["diff", "--cached", "--quiet"], CommandOutput::failure(1, ""))
                .on("*", &["rev-parse", "--abbrev-ref", "HEAD"], "main\n")
                .on("*", &["remote"], "origin\n")
                .on("*", &["pr", "create"], "https://example.test/pr/7\n"),
        );
        let plan = WorkflowPlan::from_preset("gitignore-env", &std::collections::BTreeMap::new()).unwrap();

        let summary = engine(RunConfig::default().with_assume_yes(true), &git)
            .run_repositories(plan, &repos)
            .await
            .unwrap();

        let outcome = &summary.outcomes[0].outcome;
        assert_eq!(outcome.status(), OutcomeStatus::Applied, "{outcome:?}");
        let gitignore = std::fs::read_to_string(repos[0].join(".gitignore")).unwrap();
        assert_eq!(gitignore, "target/\n.env\n.env.*\n");
        assert!(git.was_called(&repos[0], &["checkout", "-b", "chore/ignore-env-files", "main"]));
        assert!(git.was_called(&repos[0], &["push", "--set-upstream", "origin", "chore/ignore-env-files"]));
    }

    /// Cancels the run from inside its first invocation.
    #[derive(Debug)]
    struct Interrupt;

    #[async_trait]
    impl Operation for Interrupt {
        fn key(&self) -> &str {
            "demo.interrupt"
        }

        async fn run(
            &self,
            ctx: &mut StepContext<'_>,
            _options: &serde_json::Value,
        ) -> anyhow::Result<ExecutionOutcome> {
            ctx.services.cancel.cancel("operator interrupt");
            Ok(ExecutionOutcome::applied("interrupted"))
        }
    }

    /// Panics inside the worker of one repository.
    #[derive(Debug)]
    struct Explode {
        target: PathBuf,
    }

    #[async_trait]
    impl Operation for Explode {
        fn key(&self) -> &str {
            "demo.explode"
        }

        async fn run(
            &self,
            ctx: &mut StepContext<'_>,
            _options: &serde_json::Value,
        ) -> anyhow::Result<ExecutionOutcome> {
            if ctx.root() == self.target.as_path() {
                panic!("worker blew up");
            }
            Ok(ExecutionOutcome::applied("fine"))
        }
    }

    /// Cancels the run on its first invocation, then keeps its permit busy.
    #[derive(Debug, Default)]
    struct CancelAndHold {
        started: AtomicBool,
    }

    #[async_trait]
    impl Operation for CancelAndHold {
        fn key(&self) -> &str {
            "demo.hold"
        }

        async fn run(
            &self,
            ctx: &mut StepContext<'_>,
            _options: &serde_json::Value,
        ) -> anyhow::Result<ExecutionOutcome> {
            if !self.started.swap(true, Ordering::SeqCst) {
                ctx.services.cancel.cancel("operator interrupt");
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(ExecutionOutcome::applied("held"))
        }
    }

    /// Records step names in call order across repositories.
    #[derive(Debug, Default)]
    struct CallLog {
        steps: parking_lot::Mutex<Vec<String>>,
    }

    impl CallLog {
        fn steps(&self) -> Vec<String> {
            self.steps.lock().clone()
        }
    }

    #[async_trait]
    impl Operation for CallLog {
        fn key(&self) -> &str {
            "demo.log"
        }

        async fn run(
            &self,
            ctx: &mut StepContext<'_>,
            _options: &serde_json::Value,
        ) -> anyhow::Result<ExecutionOutcome> {
            self.steps.lock().push(ctx.step.to_string());
            Ok(ExecutionOutcome::applied("logged"))
        }
    }
}
