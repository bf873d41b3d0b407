//! `repo.rename`: move a path inside the repository.

use crate::core::{ExecutionOutcome, OutcomeCode};
use crate::operations::{parse_options, Operation, StepContext};
use crate::tasks::relative_path;
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RenameOptions {
    from: String,
    to: String,
}

/// Renames a file or directory and records both paths in the ledger.
///
/// Re-running after a successful rename is a no-op skip.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenamePath;

#[async_trait]
impl Operation for RenamePath {
    fn key(&self) -> &str {
        "repo.rename"
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        options: &serde_json::Value,
    ) -> anyhow::Result<ExecutionOutcome> {
        let opts: RenameOptions = parse_options(self.key(), options)?;
        let from = relative_path(self.key(), &ctx.render(&opts.from, None)?)?;
        let to = relative_path(self.key(), &ctx.render(&opts.to, None)?)?;
        let source = ctx.root().join(&from);
        let target = ctx.root().join(&to);

        let source_exists = tokio::fs::try_exists(&source).await?;
        let target_exists = tokio::fs::try_exists(&target).await?;
        match (source_exists, target_exists) {
            (false, true) => {
                return Ok(ExecutionOutcome::skipped(
                    OutcomeCode::NoChanges,
                    format!("{} already renamed to {}", from.display(), to.display()),
                ))
            }
            (false, false) => bail!("{} does not exist", from.display()),
            (true, true) => bail!("{} already exists", to.display()),
            (true, false) => {}
        }

        if ctx.dry_run() {
            return Ok(ExecutionOutcome::skipped(
                OutcomeCode::DryRun,
                format!("would rename {} -> {}", from.display(), to.display()),
            ));
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::rename(&source, &target)
            .await
            .with_context(|| format!("renaming {} to {}", from.display(), to.display()))?;

        ctx.ledger.record(from.clone());
        ctx.ledger.record(to.clone());
        ctx.log
            .info(format!("renamed {} -> {}", from.display(), to.display()));

        Ok(
            ExecutionOutcome::applied(format!("renamed {} -> {}", from.display(), to.display()))
                .with_detail("from", serde_json::json!(from))
                .with_detail("to", serde_json::json!(to)),
        )
    }
}
