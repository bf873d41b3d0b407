//! `audit.report`: one-shot fleet overview.

use crate::context::{MutationLedger, ObservedState};
use crate::core::ExecutionOutcome;
use crate::operations::{GlobalContext, Operation, OperationScope};
use async_trait::async_trait;
use serde_json::json;

/// Reports branch and dirty-path counts for every repository, once per run.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditReport;

#[async_trait]
impl Operation for AuditReport {
    fn key(&self) -> &str {
        "audit.report"
    }

    fn scope(&self) -> OperationScope {
        OperationScope::Global
    }

    async fn run_global(
        &self,
        ctx: &mut GlobalContext<'_>,
        _options: &serde_json::Value,
    ) -> anyhow::Result<ExecutionOutcome> {
        let untouched = MutationLedger::new();
        let mut rows = Vec::with_capacity(ctx.repos.len());
        let mut dirty_repos = 0;

        for repo in ctx.repos {
            match ObservedState::observe(&ctx.services.git, &repo.path, &untouched).await {
                Ok(state) => {
                    let untracked = state.dirty.iter().filter(|d| d.untracked).count();
                    if !state.dirty.is_empty() {
                        dirty_repos += 1;
                        ctx.log.warn(format!(
                            "{}: {} dirty path(s), {} untracked",
                            repo.slug(),
                            state.dirty.len(),
                            untracked
                        ));
                    }
                    rows.push(json!({
                        "path": repo.path,
                        "slug": repo.slug(),
                        "branch": state.branch,
                        "dirty": state.dirty.len(),
                        "untracked": untracked,
                    }));
                }
                Err(e) => {
                    ctx.log.warn(format!("{}: {e}", repo.slug()));
                    rows.push(json!({ "path": repo.path, "slug": repo.slug(), "error": e.to_string() }));
                }
            }
        }

        Ok(ExecutionOutcome::applied(format!(
            "audited {} repositories, {} dirty",
            ctx.repos.len(),
            dirty_repos
        ))
        .with_detail("repositories", serde_json::Value::Array(rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RepoLog, RepositoryContext};
    use crate::testing::{fixtures, ScriptedExecutor};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_audit_counts_dirty() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on("*", &["rev-parse", "--abbrev-ref", "HEAD"], "main\n")
                .on("/b", &["status"], " M src/lib.rs\0?? notes.txt\0"),
        );
        let services = fixtures::services(executor);
        let repos = vec![
            Arc::new(RepositoryContext::new("/a")),
            Arc::new(RepositoryContext::new("/b")),
        ];
        let mut log = RepoLog::new();
        let mut ctx = GlobalContext {
            services: &services,
            repos: &repos,
            log: &mut log,
            step: "audit",
        };

        let outcome = AuditReport
            .run_global(&mut ctx, &serde_json::Value::Null)
            .await
            .unwrap();

        assert_eq!(outcome.reason(), "audited 2 repositories, 1 dirty");
        let rows = outcome.details["repositories"].as_array().unwrap();
        assert_eq!(rows[1]["dirty"], 2);
        assert_eq!(rows[1]["untracked"], 1);
        assert_eq!(log.lines().len(), 1);
    }
}
