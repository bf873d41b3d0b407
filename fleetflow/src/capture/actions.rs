//! Capture and restore against a live repository.

use super::{CaptureKind, CaptureSpec, CaptureStore, CaptureWrite, RestoreSpec};
use crate::core::{ExecutionOutcome, OutcomeCode};
use crate::errors::FleetflowError;
use crate::exec::Git;
use std::path::Path;

/// Reads the current branch or commit and records it under `spec.name`.
///
/// A detached HEAD cannot be captured as a branch.
pub async fn capture_current(
    git: &Git,
    store: &CaptureStore,
    root: &Path,
    spec: &CaptureSpec,
) -> Result<ExecutionOutcome, FleetflowError> {
    let value = match spec.kind {
        CaptureKind::Branch => git.current_branch(root).await?.ok_or_else(|| {
            FleetflowError::InvalidOptions {
                command: "capture".to_string(),
                message: format!("cannot capture '{}' as a branch: HEAD is detached", spec.name),
            }
        })?,
        CaptureKind::Commit => git.head_commit(root).await?,
    };

    Ok(match store.capture(root, &spec.name, spec.kind, value, spec.overwrite) {
        CaptureWrite::Stored(captured) => {
            let verb = if captured.overwritten { "re-captured" } else { "captured" };
            ExecutionOutcome::applied(format!("{verb} {} = {}", captured.name, captured.value))
                .with_detail("capture", serde_json::json!(captured))
        }
        CaptureWrite::Kept(existing) => ExecutionOutcome::skipped(
            OutcomeCode::NoChanges,
            format!(
                "{} already captured as {}; pass overwrite to replace it",
                existing.name, existing.value
            ),
        ),
    })
}

/// Checks out a previously captured value.
///
/// Fails with [`CaptureError::Missing`](crate::errors::CaptureError) before
/// touching the repository when nothing was captured under the name.
pub async fn restore_captured(
    git: &Git,
    store: &CaptureStore,
    root: &Path,
    spec: &RestoreSpec,
    dry_run: bool,
) -> Result<ExecutionOutcome, FleetflowError> {
    let captured = store.get(root, &spec.name)?;
    if dry_run {
        return Ok(ExecutionOutcome::skipped(
            OutcomeCode::DryRun,
            format!("would check out {} ({})", captured.value, captured.name),
        ));
    }

    if let Some(current) = git.current_branch(root).await? {
        if captured.kind == CaptureKind::Branch && current == captured.value {
            return Ok(ExecutionOutcome::skipped(
                OutcomeCode::NoChanges,
                format!("already on {}", captured.value),
            ));
        }
    }

    git.checkout(root, &captured.value).await?;
    Ok(ExecutionOutcome::applied(format!(
        "restored {} ({})",
        captured.name, captured.value
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CaptureError;
    use crate::testing::ScriptedExecutor;
    use std::sync::Arc;

    fn git(executor: &Arc<ScriptedExecutor>) -> Git {
        Git::new(executor.clone(), "git")
    }

    #[tokio::test]
    async fn test_capture_branch_is_write_once() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("/r", &["rev-parse", "--abbrev-ref", "HEAD"], "main\n"),
        );
        let store = CaptureStore::new();
        let spec = CaptureSpec {
            name: "original".into(),
            kind: CaptureKind::Branch,
            overwrite: false,
        };

        let first = capture_current(&git(&executor), &store, Path::new("/r"), &spec).await.unwrap();
        assert!(first.is_applied());

        let second = capture_current(&git(&executor), &store, Path::new("/r"), &spec).await.unwrap();
        assert!(second.is_skipped());
        assert_eq!(store.get(Path::new("/r"), "original").unwrap().value, "main");
    }

    #[tokio::test]
    async fn test_restore_missing_fails_fast() {
        let executor = Arc::new(ScriptedExecutor::new());
        let store = CaptureStore::new();
        let err = restore_captured(
            &git(&executor),
            &store,
            Path::new("/r"),
            &RestoreSpec { name: "nope".into() },
            false,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FleetflowError::Capture(CaptureError::Missing { .. })));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restore_checks_out_value() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("/r", &["rev-parse", "--abbrev-ref", "HEAD"], "feature\n"),
        );
        let store = CaptureStore::new();
        store.capture(Path::new("/r"), "original", CaptureKind::Branch, "main", false);

        let outcome = restore_captured(
            &git(&executor),
            &store,
            Path::new("/r"),
            &RestoreSpec { name: "original".into() },
            false,
        )
        .await
        .unwrap();

        assert!(outcome.is_applied());
        assert!(executor.was_called("/r", &["checkout", "main"]));
    }
}
