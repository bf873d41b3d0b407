//! Run summary and per-step records.

use crate::core::{ExecutionOutcome, OutcomeCode, OutcomeStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Outcome of one step for one repository (or of a global step).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Repository path; `None` for a global step.
    pub repository: Option<PathBuf>,
    /// Step name.
    pub step: String,
    /// Stage index.
    pub stage: usize,
    /// What happened.
    pub outcome: ExecutionOutcome,
}

/// Aggregate result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run identifier.
    pub run_id: Uuid,
    /// Outcomes with status `applied`.
    pub applied: usize,
    /// Outcomes with status `skipped`.
    pub skipped: usize,
    /// Outcomes with status `failed`.
    pub failed: usize,
    /// All outcomes.
    pub total: usize,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Every record, grouped by stage.
    pub outcomes: Vec<StepRecord>,
}

impl RunSummary {
    /// Creates an empty summary.
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            applied: 0,
            skipped: 0,
            failed: 0,
            total: 0,
            duration_ms: 0,
            outcomes: Vec::new(),
        }
    }

    /// Adds a record and updates the counts.
    ///
    /// An empty reason is replaced by the outcome code so no record is
    /// reported without one.
    pub fn record(&mut self, mut record: StepRecord) {
        record.outcome = record.outcome.with_reason_fallback();
        match record.outcome.status() {
            OutcomeStatus::Applied => self.applied += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.total += 1;
        self.outcomes.push(record);
    }

    /// Whether any outcome failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Records for one repository, in run order.
    pub fn for_repository<'a>(&'a self, repo: &'a Path) -> impl Iterator<Item = &'a StepRecord> + 'a {
        self.outcomes
            .iter()
            .filter(move |r| r.repository.as_deref() == Some(repo))
    }

    /// Number of records with the given code.
    #[must_use]
    pub fn count_code(&self, code: OutcomeCode) -> usize {
        self.outcomes.iter().filter(|r| r.outcome.code == code).count()
    }
}
