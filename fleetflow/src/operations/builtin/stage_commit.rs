//! `git.stage-commit`: stage the run's own edits and commit them.

use crate::context::ObservedState;
use crate::core::{ExecutionOutcome, OutcomeCode};
use crate::operations::{parse_options, Operation, StepContext};
use crate::safeguards::{Checkpoint, Gate};
use crate::tasks::relative_path;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageCommitOptions {
    message: String,
    #[serde(default)]
    paths: Vec<String>,
}

/// Stages ledger paths (plus any listed `paths`) and commits them.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageCommit;

#[async_trait]
impl Operation for StageCommit {
    fn key(&self) -> &str {
        "git.stage-commit"
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        options: &serde_json::Value,
    ) -> anyhow::Result<ExecutionOutcome> {
        let opts: StageCommitOptions = parse_options(self.key(), options)?;

        let mut paths = ctx.ledger.paths();
        for extra in &opts.paths {
            let path = relative_path(self.key(), &ctx.render(extra, None)?)?;
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Ok(ExecutionOutcome::skipped(
                OutcomeCode::NoChanges,
                "nothing recorded to stage",
            ));
        }

        let message = ctx.render(&opts.message, None)?;
        if ctx.dry_run() {
            return Ok(ExecutionOutcome::skipped(
                OutcomeCode::DryRun,
                format!("would commit {} path(s)", paths.len()),
            ));
        }

        let git = &ctx.services.git;
        git.add(ctx.root(), &paths)
            .await
            .context("staging recorded paths")?;
        let staged = git.has_staged_changes(ctx.root()).await?;

        let state = ObservedState::new(ctx.root()).with_staged_changes(staged);
        match ctx
            .services
            .evaluator
            .evaluate(ctx.safeguards, &state, Checkpoint::Changes)
            .gate()
        {
            Gate::Halt(reason) => return Ok(ExecutionOutcome::halted(reason)),
            Gate::Skip(reason) => {
                return Ok(ExecutionOutcome::skipped(OutcomeCode::SafeguardSoftSkip, reason))
            }
            Gate::Proceed => {}
        }

        if !staged {
            return Ok(ExecutionOutcome::skipped(
                OutcomeCode::NoChanges,
                "no changes staged",
            ));
        }

        git.commit(ctx.root(), &message).await.context("committing")?;
        ctx.log.info(format!("committed {} path(s)", paths.len()));

        Ok(
            ExecutionOutcome::applied(format!("committed {} path(s)", paths.len()))
                .with_detail("paths", serde_json::json!(paths)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::testing::{fixtures, ScriptedExecutor};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stages_only_ledger_paths() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on_output("*", &["diff", "--cached", "--quiet"], CommandOutput::failure(1, "")),
        );
        let services = fixtures::services(executor.clone());
        let mut harness = fixtures::StepHarness::new("/r");
        harness.ledger.record("LICENSE");

        let outcome = StageCommit
            .run(&mut harness.context(&services), &serde_json::json!({"message": "chore: license"}))
            .await
            .unwrap();

        assert!(outcome.is_applied());
        assert!(executor.was_called("/r", &["add", "--all", "--", "LICENSE"]));
        assert!(executor.was_called("/r", &["commit", "--file", "-"]));
        assert_eq!(executor.calls_matching(&["add"]).len(), 1);
    }

    #[tokio::test]
    async fn test_empty_ledger_skips_without_git() {
        let executor = Arc::new(ScriptedExecutor::new());
        let services = fixtures::services(executor.clone());
        let mut harness = fixtures::StepHarness::new("/r");

        let outcome = StageCommit
            .run(&mut harness.context(&services), &serde_json::json!({"message": "m"}))
            .await
            .unwrap();

        assert_eq!(outcome.code, OutcomeCode::NoChanges);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_staged_skips_commit() {
        let executor = Arc::new(ScriptedExecutor::new());
        let services = fixtures::services(executor.clone());
        let mut harness = fixtures::StepHarness::new("/r");
        harness.ledger.record("README.md");

        let outcome = StageCommit
            .run(&mut harness.context(&services), &serde_json::json!({"message": "m"}))
            .await
            .unwrap();

        assert_eq!(outcome.code, OutcomeCode::NoChanges);
        assert!(!executor.was_called("/r", &["commit", "--file", "-"]));
    }
}
