//! Confirmation session with a one-way upgrade to auto-accept.

use crate::errors::FleetflowError;
use parking_lot::Mutex;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::info;

/// How the session answers confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    /// Ask the prompter every time.
    Ask,
    /// Accept without asking, for the rest of the run.
    AutoAccept,
}

/// What the operator typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    /// Accept this one.
    Yes,
    /// Decline this one.
    No,
    /// Accept this one and every later one.
    All,
}

/// Result of a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Whether the action may proceed.
    pub confirmed: bool,
    /// Whether the session is (now) in auto-accept mode.
    pub apply_to_all: bool,
}

/// Asks the operator a yes/no/all question.
pub trait Prompter: Send + Sync {
    /// Presents the prompt and returns the answer.
    fn ask(&self, prompt: &str) -> Result<PromptAnswer, FleetflowError>;
}

/// Interprets typed input: `y`/`yes`, `a`/`all` (case-insensitive); anything else is no.
#[must_use]
pub fn parse_answer(input: &str) -> PromptAnswer {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => PromptAnswer::Yes,
        "a" | "all" => PromptAnswer::All,
        _ => PromptAnswer::No,
    }
}

/// Prompter reading answers from standard input.
///
/// Blocks the calling worker thread while waiting for input.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&self, prompt: &str) -> Result<PromptAnswer, FleetflowError> {
        let mut stderr = std::io::stderr().lock();
        write!(stderr, "{prompt} [y/N/a] ").map_err(|e| FleetflowError::Prompt(e.to_string()))?;
        stderr.flush().map_err(|e| FleetflowError::Prompt(e.to_string()))?;

        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| FleetflowError::Prompt(e.to_string()))?;
        Ok(parse_answer(&line))
    }
}

/// Shared confirmation state for one run.
///
/// The mode lock is held while the prompter runs, so concurrent workers queue
/// behind an open prompt and observe an "all" answer as soon as it is given.
pub struct ConfirmationSession {
    mode: Mutex<ConfirmMode>,
    prompter: Arc<dyn Prompter>,
}

impl ConfirmationSession {
    /// Creates a session; `assume_yes` starts it in auto-accept mode.
    pub fn new(assume_yes: bool, prompter: Arc<dyn Prompter>) -> Self {
        let mode = if assume_yes {
            ConfirmMode::AutoAccept
        } else {
            ConfirmMode::Ask
        };
        Self {
            mode: Mutex::new(mode),
            prompter,
        }
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> ConfirmMode {
        *self.mode.lock()
    }

    /// Asks for confirmation unless the session already auto-accepts.
    pub fn confirm(&self, prompt: &str) -> Result<Confirmation, FleetflowError> {
        let mut mode = self.mode.lock();
        if *mode == ConfirmMode::AutoAccept {
            return Ok(Confirmation {
                confirmed: true,
                apply_to_all: true,
            });
        }

        let answer = self.prompter.ask(prompt)?;
        if answer == PromptAnswer::All {
            info!("Confirmation upgraded to auto-accept for the rest of the run");
            *mode = ConfirmMode::AutoAccept;
        }

        Ok(Confirmation {
            confirmed: answer != PromptAnswer::No,
            apply_to_all: answer == PromptAnswer::All,
        })
    }
}

impl std::fmt::Debug for ConfirmationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationSession")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPrompter;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y"), PromptAnswer::Yes);
        assert_eq!(parse_answer(" YES \n"), PromptAnswer::Yes);
        assert_eq!(parse_answer("A"), PromptAnswer::All);
        assert_eq!(parse_answer("all"), PromptAnswer::All);
        assert_eq!(parse_answer(""), PromptAnswer::No);
        assert_eq!(parse_answer("nope"), PromptAnswer::No);
    }

    #[test]
    fn test_assume_yes_never_prompts() {
        let prompter = Arc::new(ScriptedPrompter::new(Vec::new()));
        let session = ConfirmationSession::new(true, prompter.clone());

        let result = session.confirm("push?").unwrap();
        assert!(result.confirmed);
        assert_eq!(prompter.prompts().len(), 0);
    }

    #[test]
    fn test_all_upgrades_session_permanently() {
        let prompter = Arc::new(ScriptedPrompter::new(vec![
            PromptAnswer::No,
            PromptAnswer::All,
            PromptAnswer::No,
        ]));
        let session = ConfirmationSession::new(false, prompter.clone());

        assert!(!session.confirm("first").unwrap().confirmed);
        let second = session.confirm("second").unwrap();
        assert!(second.confirmed && second.apply_to_all);
        assert_eq!(session.mode(), ConfirmMode::AutoAccept);

        for _ in 0..5 {
            assert!(session.confirm("later").unwrap().confirmed);
        }
        assert_eq!(prompter.prompts(), vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_all_applies_across_workers() {
        let prompter = Arc::new(ScriptedPrompter::new(vec![PromptAnswer::All]));
        let session = Arc::new(ConfirmationSession::new(false, prompter.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let session = session.clone();
                tokio::spawn(async move { session.confirm(&format!("repo-{i}")).unwrap() })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().confirmed);
        }
        assert_eq!(prompter.prompts().len(), 1);
    }
}
