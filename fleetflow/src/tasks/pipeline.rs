//! Task action pipeline.

use super::{apply_edits, relative_path, TaskAction, TaskDefinition};
use crate::capture::{capture_current, restore_captured};
use crate::context::ObservedState;
use crate::core::{ActionRecord, ExecutionOutcome, OutcomeCode, OutcomeStatus};
use crate::errors::{ActionError, FleetflowError};
use crate::exec::PullRequestRequest;
use crate::operations::StepContext;
use crate::safeguards::{Checkpoint, Gate};
use tracing::debug;

/// Runs one task definition against one repository.
///
/// Capture runs first and only reads. Before the restore and before every
/// action the repository is observed again and the precondition safeguards
/// are evaluated: a hard-stop halts the repository, a soft-skip skips only
/// that action. Paths in the mutation ledger never count as dirty, and a
/// branch the pipeline switched to itself is judged as the branch the task
/// started on. The `require_changes` check runs live before the commit. A
/// failed action ends the pipeline; later steps for the repository still run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskPipeline;

/// Facts carried from one action to the next.
#[derive(Debug, Default)]
struct PipelineState {
    branch: Option<String>,
    switched: bool,
    start_branch: Option<Option<String>>,
    committed: Option<bool>,
    pushed: Option<bool>,
}

impl TaskPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs the task and folds the action records into one outcome.
    pub async fn run(
        &self,
        name: &str,
        task: &TaskDefinition,
        ctx: &mut StepContext<'_>,
    ) -> ExecutionOutcome {
        let mut records = Vec::new();
        let mut state = PipelineState::default();

        if let Some(spec) = &task.capture {
            let services = ctx.services;
            match capture_current(&services.git, &services.captures, ctx.root(), spec).await {
                Ok(outcome) => {
                    ctx.log.info(outcome.reason().to_string());
                    records.push(ActionRecord::new("capture", &outcome));
                }
                Err(e) => return fail(ctx, "capture", e, records),
            }
        }

        if let Some(spec) = &task.restore {
            let outcome = match preconditions(task, ctx, &mut state).await {
                Err(e) => return fail(ctx, "restore", e, records),
                Ok(Gate::Halt(reason)) => return halt(ctx, "restore", reason, records),
                Ok(Gate::Skip(reason)) => {
                    ctx.log.warn(format!("restore: {reason}"));
                    ExecutionOutcome::skipped(OutcomeCode::SafeguardSoftSkip, reason)
                }
                Ok(Gate::Proceed) => {
                    let services = ctx.services;
                    match restore_captured(&services.git, &services.captures, ctx.root(), spec, ctx.dry_run()).await {
                        Ok(outcome) => {
                            ctx.log.info(outcome.reason().to_string());
                            outcome
                        }
                        Err(e) => return fail(ctx, "restore", e, records),
                    }
                }
            };
            records.push(ActionRecord::new("restore", &outcome));
        }

        for action in task.actions() {
            let outcome = match preconditions(task, ctx, &mut state).await {
                Err(e) => return fail(ctx, action.as_str(), e, records),
                Ok(Gate::Halt(reason)) => return halt(ctx, action.as_str(), reason, records),
                Ok(Gate::Skip(reason)) => {
                    ctx.log.warn(format!("{action}: {reason}"));
                    ExecutionOutcome::skipped(OutcomeCode::SafeguardSoftSkip, reason)
                }
                Ok(Gate::Proceed) => {
                    debug!(task = name, action = %action, "Running action");
                    match self.run_action(action, name, task, ctx, &mut state).await {
                        Ok(outcome) => outcome,
                        Err(e) => return fail(ctx, action.as_str(), e, records),
                    }
                }
            };

            if outcome.is_skipped() && outcome.code != OutcomeCode::SafeguardSoftSkip {
                ctx.log.info(format!("{action}: skipped ({})", outcome.reason()));
            }
            records.push(ActionRecord::new(action.as_str(), &outcome));
            if outcome.halts_repository() {
                return outcome.with_actions(records);
            }
        }

        summarize(name, records)
    }

    async fn run_action(
        &self,
        action: TaskAction,
        name: &str,
        task: &TaskDefinition,
        ctx: &mut StepContext<'_>,
        state: &mut PipelineState,
    ) -> Result<ExecutionOutcome, FleetflowError> {
        match action {
            TaskAction::BranchPrepare => prepare_branch(name, task, ctx, state).await,
            TaskAction::FilesApply => apply_files(name, task, ctx),
            TaskAction::GitStage => stage(name, task, ctx).await,
            TaskAction::GitCommit => commit(name, task, ctx, state).await,
            TaskAction::GitPush => push(task, ctx, state).await,
            TaskAction::PullRequestCreate => open_pull_request(name, task, ctx, state).await,
        }
    }
}

async fn prepare_branch(
    name: &str,
    task: &TaskDefinition,
    ctx: &mut StepContext<'_>,
    state: &mut PipelineState,
) -> Result<ExecutionOutcome, FleetflowError> {
    let Some(block) = &task.branch else {
        return Ok(ExecutionOutcome::skipped(OutcomeCode::NotConfigured, "no branch configured"));
    };
    let branch = ctx.render(&block.name, Some(name))?;
    let start_point = block
        .start_point
        .as_deref()
        .map(|start| ctx.render(start, Some(name)))
        .transpose()?;
    let git = &ctx.services.git;
    let root = ctx.root();

    if git.current_branch(root).await?.as_deref() == Some(branch.as_str()) {
        state.branch = Some(branch.clone());
        return Ok(ExecutionOutcome::skipped(
            OutcomeCode::NoChanges,
            format!("already on {branch}"),
        ));
    }

    let exists = git.branch_exists(root, &branch).await;
    if !exists && !block.create_if_missing {
        return Ok(ExecutionOutcome::skipped(
            OutcomeCode::NotConfigured,
            format!("branch {branch} does not exist and create_if_missing is off"),
        ));
    }

    state.branch = Some(branch.clone());
    if ctx.dry_run() {
        return Ok(ExecutionOutcome::skipped(
            OutcomeCode::DryRun,
            format!("would prepare branch {branch}"),
        ));
    }

    if exists {
        git.checkout(root, &branch).await?;
        state.switched = true;
        ctx.log.info(format!("switched to {branch}"));
        return Ok(ExecutionOutcome::applied(format!("switched to {branch}")));
    }

    git.create_branch(root, &branch, start_point.as_deref()).await?;
    state.switched = true;
    let remote = &ctx.services.config.remote;
    if git.remote_branch_exists(root, remote, &branch).await {
        git.set_upstream(root, remote, &branch).await?;
        ctx.log.info(format!("created {branch} tracking {remote}/{branch}"));
    } else {
        ctx.log
            .info(format!("created {branch}; no {remote}/{branch} to track yet"));
    }
    Ok(ExecutionOutcome::applied(format!("created branch {branch}")))
}

fn apply_files(
    name: &str,
    task: &TaskDefinition,
    ctx: &mut StepContext<'_>,
) -> Result<ExecutionOutcome, FleetflowError> {
    if task.files.is_empty() {
        return Ok(ExecutionOutcome::skipped(OutcomeCode::NotConfigured, "no file edits configured"));
    }

    let template_context = ctx.template_context(Some(name));
    let report = apply_edits(
        ctx.root(),
        &task.files,
        &ctx.services.templates,
        &template_context,
        ctx.dry_run(),
    )?;
    let changed = serde_json::json!(report.changed);
    for path in &report.changed {
        ctx.ledger.record(path.clone());
    }

    if ctx.dry_run() {
        return Ok(ExecutionOutcome::skipped(
            OutcomeCode::DryRun,
            format!("would change {} file(s)", report.changed.len()),
        )
        .with_detail("files", changed));
    }
    if report.changed.is_empty() {
        return Ok(ExecutionOutcome::skipped(OutcomeCode::NoChanges, "files already up to date"));
    }

    for path in &report.changed {
        ctx.log.info(format!("updated {}", path.display()));
    }
    Ok(
        ExecutionOutcome::applied(format!("changed {} file(s)", report.changed.len()))
            .with_detail("files", changed),
    )
}

async fn stage(
    name: &str,
    task: &TaskDefinition,
    ctx: &mut StepContext<'_>,
) -> Result<ExecutionOutcome, FleetflowError> {
    let mut paths = ctx.ledger.paths();
    for extra in &task.stage_paths {
        let path = relative_path(TaskAction::GitStage.as_str(), &ctx.render(extra, Some(name))?)?;
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Ok(ExecutionOutcome::skipped(OutcomeCode::NoChanges, "nothing recorded to stage"));
    }
    if ctx.dry_run() {
        return Ok(ExecutionOutcome::skipped(
            OutcomeCode::DryRun,
            format!("would stage {} path(s)", paths.len()),
        ));
    }

    ctx.services.git.add(ctx.root(), &paths).await?;
    Ok(ExecutionOutcome::applied(format!("staged {} path(s)", paths.len()))
        .with_detail("paths", serde_json::json!(paths)))
}

async fn commit(
    name: &str,
    task: &TaskDefinition,
    ctx: &mut StepContext<'_>,
    state: &mut PipelineState,
) -> Result<ExecutionOutcome, FleetflowError> {
    let Some(block) = &task.commit else {
        state.committed = Some(false);
        return Ok(ExecutionOutcome::skipped(OutcomeCode::NotConfigured, "no commit message configured"));
    };
    let message = ctx.render(&block.message, Some(name))?;
    if ctx.dry_run() {
        return Ok(ExecutionOutcome::skipped(OutcomeCode::DryRun, "would commit"));
    }
    state.committed = Some(false);

    let git = &ctx.services.git;
    let staged = git.has_staged_changes(ctx.root()).await?;
    let observed = ObservedState::new(ctx.root()).with_staged_changes(staged);
    match ctx
        .services
        .evaluator
        .evaluate(&task.safeguards, &observed, Checkpoint::Changes)
        .gate()
    {
        Gate::Halt(reason) => return Ok(ExecutionOutcome::halted(reason)),
        Gate::Skip(reason) => {
            ctx.log.warn(format!("git-commit: {reason}"));
            return Ok(ExecutionOutcome::skipped(OutcomeCode::SafeguardSoftSkip, reason));
        }
        Gate::Proceed => {}
    }
    if !staged {
        return Ok(ExecutionOutcome::skipped(OutcomeCode::NoChanges, "no changes staged"));
    }

    git.commit(ctx.root(), &message).await?;
    state.committed = Some(true);
    let summary = message.lines().next().unwrap_or_default().to_string();
    ctx.log.info(format!("committed: {summary}"));
    Ok(ExecutionOutcome::applied(format!("committed: {summary}")))
}

async fn push(
    task: &TaskDefinition,
    ctx: &mut StepContext<'_>,
    state: &mut PipelineState,
) -> Result<ExecutionOutcome, FleetflowError> {
    state.pushed = Some(false);
    if state.committed == Some(false) {
        return Ok(ExecutionOutcome::skipped(OutcomeCode::NoChanges, "nothing was committed"));
    }

    let git = &ctx.services.git;
    let remote = ctx.services.config.remote.clone();
    if !git.remotes(ctx.root()).await?.contains(&remote) {
        ctx.log
            .warn(format!("remote '{remote}' is not configured; not pushing"));
        return Ok(ExecutionOutcome::skipped(
            OutcomeCode::NoRemote,
            format!("remote '{remote}' is not configured"),
        ));
    }

    let branch = match &state.branch {
        Some(branch) => branch.clone(),
        None => match git.current_branch(ctx.root()).await? {
            Some(branch) => branch,
            None => {
                return Ok(ExecutionOutcome::skipped(
                    OutcomeCode::NotConfigured,
                    "HEAD is detached; nothing to push",
                ))
            }
        },
    };

    if ctx.dry_run() {
        return Ok(ExecutionOutcome::skipped(
            OutcomeCode::DryRun,
            format!("would push {branch} to {remote}"),
        ));
    }
    if task.confirm
        && !ctx
            .confirm(format!("Push {branch} to {remote} for {}?", ctx.repo.slug()))
            .await?
    {
        return Ok(ExecutionOutcome::skipped(OutcomeCode::OperatorDeclined, "push declined"));
    }

    git.push(ctx.root(), &remote, &branch).await?;
    state.pushed = Some(true);
    state.branch = Some(branch.clone());
    ctx.log.info(format!("pushed {branch} to {remote}"));
    Ok(ExecutionOutcome::applied(format!("pushed {branch} to {remote}")))
}

async fn open_pull_request(
    name: &str,
    task: &TaskDefinition,
    ctx: &mut StepContext<'_>,
    state: &mut PipelineState,
) -> Result<ExecutionOutcome, FleetflowError> {
    let Some(block) = &task.pull_request else {
        return Ok(ExecutionOutcome::skipped(OutcomeCode::NotConfigured, "no pull request configured"));
    };
    if ctx.dry_run() {
        return Ok(ExecutionOutcome::skipped(OutcomeCode::DryRun, "would open a pull request"));
    }
    if state.pushed == Some(false) {
        return Ok(ExecutionOutcome::skipped(OutcomeCode::PushSkipped, "push was skipped"));
    }

    let head = match &state.branch {
        Some(branch) => branch.clone(),
        None => ctx
            .services
            .git
            .current_branch(ctx.root())
            .await?
            .unwrap_or_default(),
    };
    let base = match &block.base {
        Some(base) => ctx.render(base, Some(name))?,
        None => ctx.repo.default_branch.clone(),
    };
    if head.is_empty() || head == base {
        return Ok(ExecutionOutcome::skipped(
            OutcomeCode::NoChanges,
            format!("head '{head}' has nothing to propose against '{base}'"),
        ));
    }

    let request = PullRequestRequest {
        title: ctx.render(&block.title, Some(name))?,
        body: ctx.render(&block.body, Some(name))?,
        base,
        head,
        draft: block.draft,
    };
    if task.confirm
        && !ctx
            .confirm(format!(
                "Open pull request {} -> {} for {}?",
                request.head,
                request.base,
                ctx.repo.slug()
            ))
            .await?
    {
        return Ok(ExecutionOutcome::skipped(
            OutcomeCode::OperatorDeclined,
            "pull request declined",
        ));
    }

    let url = ctx
        .services
        .platform
        .create_pull_request(ctx.root(), &request)
        .await?;
    ctx.log.info(format!("opened pull request {url}"));
    Ok(ExecutionOutcome::applied(format!("opened pull request {url}"))
        .with_detail("url", serde_json::json!(url)))
}

/// Observes the repository and evaluates the task's precondition safeguards.
async fn preconditions(
    task: &TaskDefinition,
    ctx: &StepContext<'_>,
    state: &mut PipelineState,
) -> Result<Gate, FleetflowError> {
    if task.safeguards.is_empty() {
        return Ok(Gate::Proceed);
    }
    let mut observed = ctx.observe().await?;
    let start = state
        .start_branch
        .get_or_insert_with(|| observed.branch.clone())
        .clone();
    if state.switched && observed.branch == state.branch {
        observed.branch = start;
    }
    Ok(ctx
        .services
        .evaluator
        .evaluate(&task.safeguards, &observed, Checkpoint::Preconditions)
        .gate())
}

fn halt(
    ctx: &mut StepContext<'_>,
    action: &str,
    reason: String,
    mut records: Vec<ActionRecord>,
) -> ExecutionOutcome {
    ctx.log.warn(format!("{action}: {reason}"));
    let outcome = ExecutionOutcome::halted(reason);
    records.push(ActionRecord::new(action, &outcome));
    outcome.with_actions(records)
}

fn fail(
    ctx: &mut StepContext<'_>,
    action: &str,
    error: FleetflowError,
    mut records: Vec<ActionRecord>,
) -> ExecutionOutcome {
    let error: FleetflowError = ActionError::new(action, ctx.root(), error).into();
    ctx.log.warn(error.to_string());
    let outcome = ExecutionOutcome::from_error(&error);
    records.push(ActionRecord::new(action, &outcome));
    outcome.with_actions(records)
}

fn summarize(name: &str, records: Vec<ActionRecord>) -> ExecutionOutcome {
    let applied: Vec<&str> = records
        .iter()
        .filter(|r| r.status() == OutcomeStatus::Applied)
        .map(|r| r.action.as_str())
        .collect();

    if !applied.is_empty() {
        let message = format!("task '{name}': applied {}", applied.join(", "));
        return ExecutionOutcome::applied(message).with_actions(records);
    }

    match records.iter().find(|r| r.action != "capture" && r.action != "restore") {
        Some(first) => {
            let code = first.code;
            let reason = format!("task '{name}': nothing applied ({}: {})", first.action, first.reason());
            ExecutionOutcome::skipped(code, reason).with_actions(records)
        }
        None => ExecutionOutcome::skipped(
            OutcomeCode::NotConfigured,
            format!("task '{name}' has no actions to run"),
        )
        .with_actions(records),
    }
}
