//! Structured run events.
//!
//! The engine emits one [`RunEvent::StepOutcome`] per (repository, step) and a
//! closing [`RunEvent::RunSummary`]. Formatting for a terminal is left to the
//! consumer of the stream.

mod sink;

pub use sink::{CollectingEventSink, EventSink, JsonLinesEventSink, LoggingEventSink, NoOpEventSink};

use crate::context::LogLine;
use crate::runner::{RunSummary, StepRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One event on the output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// A step finished (or was skipped) for one repository, or once globally.
    StepOutcome {
        /// Run identifier.
        run_id: Uuid,
        /// Emission time.
        timestamp: DateTime<Utc>,
        /// The recorded outcome.
        record: StepRecord,
        /// Lines buffered while the step ran, in order.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        log: Vec<LogLine>,
    },
    /// The run finished.
    RunSummary {
        /// Run identifier.
        run_id: Uuid,
        /// Emission time.
        timestamp: DateTime<Utc>,
        /// Aggregate counts and every outcome.
        summary: RunSummary,
    },
}

impl RunEvent {
    /// Builds a step outcome event stamped now.
    #[must_use]
    pub fn step_outcome(run_id: Uuid, record: StepRecord, log: Vec<LogLine>) -> Self {
        Self::StepOutcome {
            run_id,
            timestamp: Utc::now(),
            record,
            log,
        }
    }

    /// Builds the closing summary event stamped now.
    #[must_use]
    pub fn run_summary(summary: RunSummary) -> Self {
        Self::RunSummary {
            run_id: summary.run_id,
            timestamp: Utc::now(),
            summary,
        }
    }

    /// Event type name, as serialized in the `event` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StepOutcome { .. } => "step_outcome",
            Self::RunSummary { .. } => "run_summary",
        }
    }

    /// Run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::StepOutcome { run_id, .. } | Self::RunSummary { run_id, .. } => *run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionOutcome;
    use std::path::PathBuf;

    #[test]
    fn test_step_outcome_serializes_tagged() {
        let record = StepRecord {
            repository: Some(PathBuf::from("/src/widgets")),
            step: "license".into(),
            stage: 0,
            outcome: ExecutionOutcome::applied("committed"),
        };
        let event = RunEvent::step_outcome(Uuid::new_v4(), record, Vec::new());
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event"], event.kind());
        assert_eq!(value["record"]["step"], "license");
        assert_eq!(value["record"]["outcome"]["status"], "applied");
        assert!(value.get("log").is_none());
    }

    #[test]
    fn test_summary_carries_run_id() {
        let summary = RunSummary::new(Uuid::new_v4());
        let run_id = summary.run_id;
        let event = RunEvent::run_summary(summary);
        assert_eq!(event.run_id(), run_id);
        assert_eq!(event.kind(), "run_summary");
    }
}
