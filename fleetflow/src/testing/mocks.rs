//! Scripted collaborators for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::confirm::{PromptAnswer, Prompter};
use crate::core::ExecutionOutcome;
use crate::errors::{CommandError, FleetflowError};
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
use crate::operations::{GlobalContext, Operation, OperationScope, StepContext};

#[derive(Debug, Clone)]
struct Rule {
    cwd: Option<PathBuf>,
    args: Vec<String>,
    output: CommandOutput,
}

impl Rule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        self.cwd.as_ref().map_or(true, |cwd| *cwd == spec.cwd)
            && spec.args.len() >= self.args.len()
            && self.args.iter().zip(&spec.args).all(|(a, b)| a == b)
    }
}

/// Tracks how many invocations overlap.
#[derive(Debug, Default)]
struct Overlap {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Overlap {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// A command executor answering from a script.
///
/// Rules match on working directory (`"*"` for any) and an argv prefix; the
/// first matching rule wins. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Vec<Rule>,
    calls: Mutex<Vec<CommandSpec>>,
    delay: Option<Duration>,
    overlap: Overlap,
}

impl ScriptedExecutor {
    /// Creates an executor with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers matching commands with a successful stdout.
    #[must_use]
    pub fn on(self, cwd: &str, args: &[&str], stdout: &str) -> Self {
        self.on_output(cwd, args, CommandOutput::ok(stdout))
    }

    /// Answers matching commands with the given output.
    #[must_use]
    pub fn on_output(mut self, cwd: &str, args: &[&str], output: CommandOutput) -> Self {
        self.rules.push(Rule {
            cwd: (cwd != "*").then(|| PathBuf::from(cwd)),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            output,
        });
        self
    }

    /// Sleeps inside every invocation so overlapping calls can be observed.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every command executed, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Commands whose argv starts with `prefix`.
    #[must_use]
    pub fn calls_matching(&self, prefix: &[&str]) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .iter()
            .filter(|spec| {
                spec.args.len() >= prefix.len()
                    && prefix.iter().zip(&spec.args).all(|(a, b)| a == b)
            })
            .cloned()
            .collect()
    }

    /// Commands run in one working directory.
    #[must_use]
    pub fn calls_in(&self, cwd: impl AsRef<Path>) -> Vec<CommandSpec> {
        let cwd = cwd.as_ref();
        self.calls
            .lock()
            .iter()
            .filter(|spec| spec.cwd == cwd)
            .cloned()
            .collect()
    }

    /// Whether exactly this argv ran in `cwd`.
    #[must_use]
    pub fn was_called(&self, cwd: impl AsRef<Path>, args: &[&str]) -> bool {
        let cwd = cwd.as_ref();
        self.calls.lock().iter().any(|spec| {
            spec.cwd == cwd
                && spec.args.len() == args.len()
                && args.iter().zip(&spec.args).all(|(a, b)| a == b)
        })
    }

    /// Highest number of invocations seen in flight at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.overlap.max()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.overlap.enter();
        self.calls.lock().push(spec.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let output = self
            .rules
            .iter()
            .find(|rule| rule.matches(spec))
            .map(|rule| rule.output.clone())
            .unwrap_or_default();
        self.overlap.exit();
        Ok(output)
    }
}

/// A prompter answering from a queue; `No` once the queue runs dry.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<PromptAnswer>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    /// Creates a prompter with queued answers.
    #[must_use]
    pub fn new(answers: Vec<PromptAnswer>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts shown so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, prompt: &str) -> Result<PromptAnswer, FleetflowError> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.answers.lock().pop_front().unwrap_or(PromptAnswer::No))
    }
}

/// An operation that records every invocation and returns a configured outcome.
#[derive(Debug)]
pub struct RecordingOperation {
    key: String,
    scope: OperationScope,
    outcome: ExecutionOutcome,
    per_repo: HashMap<PathBuf, ExecutionOutcome>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(PathBuf, String)>>,
    overlap: Overlap,
}

impl RecordingOperation {
    /// A repository-scoped operation that applies.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            outcome: ExecutionOutcome::applied(format!("{key} ran")),
            key,
            scope: OperationScope::Repository,
            per_repo: HashMap::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
            overlap: Overlap::default(),
        }
    }

    /// A global operation that applies.
    #[must_use]
    pub fn global(key: impl Into<String>) -> Self {
        Self {
            scope: OperationScope::Global,
            ..Self::new(key)
        }
    }

    /// Returns this outcome by default.
    #[must_use]
    pub fn with_outcome(mut self, outcome: ExecutionOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Returns this outcome for one repository.
    #[must_use]
    pub fn with_outcome_for(mut self, repo: impl Into<PathBuf>, outcome: ExecutionOutcome) -> Self {
        self.per_repo.insert(repo.into(), outcome);
        self
    }

    /// Sleeps inside every invocation.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(repository, step)` pairs seen, in order. Global runs record an empty path.
    #[must_use]
    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().clone()
    }

    /// Number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of invocations seen in flight at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.overlap.max()
    }

    async fn record(&self, repo: &Path, step: &str) -> ExecutionOutcome {
        self.overlap.enter();
        self.calls.lock().push((repo.to_path_buf(), step.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.overlap.exit();
        self.per_repo
            .get(repo)
            .cloned()
            .unwrap_or_else(|| self.outcome.clone())
    }
}

#[async_trait]
impl Operation for RecordingOperation {
    fn key(&self) -> &str {
        &self.key
    }

    fn scope(&self) -> OperationScope {
        self.scope
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        _options: &serde_json::Value,
    ) -> anyhow::Result<ExecutionOutcome> {
        Ok(self.record(ctx.root(), ctx.step).await)
    }

    async fn run_global(
        &self,
        ctx: &mut GlobalContext<'_>,
        _options: &serde_json::Value,
    ) -> anyhow::Result<ExecutionOutcome> {
        Ok(self.record(Path::new(""), ctx.step).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_executor_first_match_wins() {
        let executor = ScriptedExecutor::new()
            .on("/a", &["status"], "a")
            .on("*", &["status"], "any");

        let a = executor
            .execute(&CommandSpec::new("git", ["status", "--porcelain=v1"], "/a"))
            .await
            .unwrap();
        let b = executor
            .execute(&CommandSpec::new("git", ["status"], "/b"))
            .await
            .unwrap();
        let other = executor
            .execute(&CommandSpec::new("git", ["log"], "/b"))
            .await
            .unwrap();

        assert_eq!(a.stdout, "a");
        assert_eq!(b.stdout, "any");
        assert_eq!(other, CommandOutput::default());
        assert_eq!(executor.calls().len(), 3);
        assert_eq!(executor.calls_in("/b").len(), 2);
        assert!(executor.was_called("/b", &["log"]));
    }

    #[test]
    fn test_scripted_prompter_defaults_to_no() {
        let prompter = ScriptedPrompter::new(vec![PromptAnswer::Yes]);
        assert_eq!(prompter.ask("one?").unwrap(), PromptAnswer::Yes);
        assert_eq!(prompter.ask("two?").unwrap(), PromptAnswer::No);
        assert_eq!(prompter.prompts(), vec!["one?", "two?"]);
    }
}
