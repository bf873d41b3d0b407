//! Registered single-shot operations.
//!
//! Every non-task step names an operation by command path (`repo.rename`,
//! `git.stage-commit`, ...). The registry is filled once before the run and
//! looked up by exact key.

pub mod builtin;
mod context;
mod registry;

pub use context::{GlobalContext, RunServices, StepContext};
pub use registry::OperationRegistry;

use crate::core::{ExecutionOutcome, OutcomeCode};
use crate::errors::FleetflowError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Where an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationScope {
    /// Once per repository.
    Repository,
    /// Once per run.
    Global,
}

/// A registered operation.
///
/// Errors are wrapped with the operation key and repository path by the step
/// executor and recorded as `failed`; skips are returned as outcomes.
#[async_trait]
pub trait Operation: Send + Sync + Debug {
    /// Command path this operation answers to.
    fn key(&self) -> &str;

    /// Where the operation runs.
    fn scope(&self) -> OperationScope {
        OperationScope::Repository
    }

    /// Runs against one repository.
    async fn run(
        &self,
        _ctx: &mut StepContext<'_>,
        _options: &serde_json::Value,
    ) -> anyhow::Result<ExecutionOutcome> {
        Ok(ExecutionOutcome::skipped(
            OutcomeCode::NotConfigured,
            format!("{} only runs globally", self.key()),
        ))
    }

    /// Runs once for the whole run.
    async fn run_global(
        &self,
        _ctx: &mut GlobalContext<'_>,
        _options: &serde_json::Value,
    ) -> anyhow::Result<ExecutionOutcome> {
        Ok(ExecutionOutcome::skipped(
            OutcomeCode::NotConfigured,
            format!("{} only runs per repository", self.key()),
        ))
    }
}

/// Deserializes a step's option bag; `null` reads as an empty map.
pub fn parse_options<T: DeserializeOwned>(
    command: &str,
    options: &serde_json::Value,
) -> Result<T, FleetflowError> {
    let value = if options.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        options.clone()
    };
    serde_json::from_value(value).map_err(|e| FleetflowError::InvalidOptions {
        command: command.to_string(),
        message: e.to_string(),
    })
}
