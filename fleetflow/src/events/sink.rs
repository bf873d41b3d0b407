//! Event sink trait and implementations.

use super::RunEvent;
use crate::core::OutcomeStatus;
use crate::context::LogLevel;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::io::Write;
use tracing::{debug, info, warn, Level};

/// Receives run events.
///
/// Sinks never fail the run: write errors are logged and dropped.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    async fn emit(&self, event: &RunEvent);

    /// Emits an event without awaiting.
    fn try_emit(&self, event: &RunEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &RunEvent) {}

    fn try_emit(&self, _event: &RunEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging outcomes at `level` (skips and failures always warn).
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &RunEvent) {
        match event {
            RunEvent::StepOutcome { record, log, .. } => {
                let repo = record
                    .repository
                    .as_ref()
                    .map_or_else(|| "<global>".to_string(), |p| p.display().to_string());
                for line in log {
                    match line.level {
                        LogLevel::Info => debug!(repo = %repo, step = %record.step, "{}", line.message),
                        LogLevel::Warn => warn!(repo = %repo, step = %record.step, "{}", line.message),
                    }
                }
                let outcome = &record.outcome;
                match outcome.status() {
                    OutcomeStatus::Applied if self.level == Level::DEBUG => debug!(
                        repo = %repo, step = %record.step, code = %outcome.code,
                        "applied: {}", outcome.reason()
                    ),
                    OutcomeStatus::Applied => info!(
                        repo = %repo, step = %record.step, code = %outcome.code,
                        "applied: {}", outcome.reason()
                    ),
                    OutcomeStatus::Skipped => info!(
                        repo = %repo, step = %record.step, code = %outcome.code,
                        "skipped: {}", outcome.reason()
                    ),
                    OutcomeStatus::Failed => warn!(
                        repo = %repo, step = %record.step, code = %outcome.code,
                        "failed: {}", outcome.reason()
                    ),
                }
            }
            RunEvent::RunSummary { summary, .. } => {
                info!(
                    run_id = %summary.run_id,
                    applied = summary.applied,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    duration_ms = summary.duration_ms,
                    "Run finished"
                );
            }
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &RunEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &RunEvent) {
        self.log_event(event);
    }
}

/// Keeps every event in memory; for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<RunEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected events.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Returns the events of one kind.
    #[must_use]
    pub fn events_of_kind(&self, kind: &str) -> Vec<RunEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind() == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &RunEvent) {
        self.events.lock().push(event.clone());
    }

    fn try_emit(&self, event: &RunEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Writes one JSON document per line.
pub struct JsonLinesEventSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesEventSink<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_event(&self, event: &RunEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, event = event.kind(), "Could not serialize event");
                return;
            }
        };
        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
            warn!(error = %e, event = event.kind(), "Could not write event");
        }
    }
}

impl JsonLinesEventSink<std::io::Stdout> {
    /// Writes to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W> fmt::Debug for JsonLinesEventSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesEventSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl<W: Write + Send> EventSink for JsonLinesEventSink<W> {
    async fn emit(&self, event: &RunEvent) {
        self.write_event(event);
    }

    fn try_emit(&self, event: &RunEvent) {
        self.write_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExecutionOutcome, OutcomeCode};
    use crate::runner::{RunSummary, StepRecord};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn outcome_event(outcome: ExecutionOutcome) -> RunEvent {
        RunEvent::step_outcome(
            Uuid::new_v4(),
            StepRecord {
                repository: Some(PathBuf::from("/src/widgets")),
                step: "rename".into(),
                stage: 1,
                outcome,
            },
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_noop_and_logging_sinks() {
        let event = outcome_event(ExecutionOutcome::skipped(OutcomeCode::NoChanges, "nothing"));
        NoOpEventSink.emit(&event).await;
        LoggingEventSink::default().emit(&event).await;
        LoggingEventSink::debug().try_emit(&event);
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&outcome_event(ExecutionOutcome::applied("done"))).await;
        sink.try_emit(&RunEvent::run_summary(RunSummary::new(Uuid::new_v4())));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events_of_kind("step_outcome").len(), 1);
        assert_eq!(sink.events_of_kind("run_summary").len(), 1);
    }

    #[tokio::test]
    async fn test_json_lines_one_line_per_event() {
        let sink = JsonLinesEventSink::new(Vec::new());
        sink.emit(&outcome_event(ExecutionOutcome::applied("done"))).await;
        sink.emit(&outcome_event(ExecutionOutcome::failed(OutcomeCode::CommandFailed, "boom")))
            .await;

        let written = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "step_outcome");
        assert_eq!(second["record"]["outcome"]["code"], "command_failed");
    }
}
