//! `git.capture` / `git.restore` between arbitrary steps.

use crate::capture::{capture_current, restore_captured, CaptureSpec, RestoreSpec};
use crate::core::ExecutionOutcome;
use crate::operations::{parse_options, Operation, StepContext};
use async_trait::async_trait;

/// Records the current branch or commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureRef;

#[async_trait]
impl Operation for CaptureRef {
    fn key(&self) -> &str {
        "git.capture"
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        options: &serde_json::Value,
    ) -> anyhow::Result<ExecutionOutcome> {
        let spec: CaptureSpec = parse_options(self.key(), options)?;
        let services = ctx.services;
        let outcome = capture_current(&services.git, &services.captures, ctx.root(), &spec).await?;
        ctx.log.info(outcome.reason().to_string());
        Ok(outcome)
    }
}

/// Checks out a captured value.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreRef;

#[async_trait]
impl Operation for RestoreRef {
    fn key(&self) -> &str {
        "git.restore"
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        options: &serde_json::Value,
    ) -> anyhow::Result<ExecutionOutcome> {
        let spec: RestoreSpec = parse_options(self.key(), options)?;
        let services = ctx.services;
        let outcome =
            restore_captured(&services.git, &services.captures, ctx.root(), &spec, ctx.dry_run())
                .await?;
        ctx.log.info(outcome.reason().to_string());
        Ok(outcome)
    }
}
