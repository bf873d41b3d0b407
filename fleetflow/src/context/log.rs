//! Buffered per-repository log section.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Severity of a buffered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Progress information.
    Info,
    /// Something the operator should look at.
    Warn,
}

/// One buffered line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Severity.
    pub level: LogLevel,
    /// Text.
    pub message: String,
}

/// Lines produced while one step runs against one repository.
///
/// The coordinator emits the whole buffer with the step's outcome event, so a
/// repository's output stays contiguous no matter how many workers run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoLog {
    lines: Vec<LogLine>,
}

impl RepoLog {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an informational line.
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "fleetflow::repo", "{message}");
        self.lines.push(LogLine {
            level: LogLevel::Info,
            message,
        });
    }

    /// Appends a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "fleetflow::repo", "{message}");
        self.lines.push(LogLine {
            level: LogLevel::Warn,
            message,
        });
    }

    /// Returns the buffered lines.
    #[must_use]
    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    /// Takes the buffered lines, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<LogLine> {
        std::mem::take(&mut self.lines)
    }
}
