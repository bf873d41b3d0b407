//! # Fleetflow
//!
//! A workflow engine that applies one plan across a fleet of local git
//! repositories.
//!
//! A plan is a list of steps. Each step names a registered operation (or a
//! declarative task) and the steps it must run `after`. Fleetflow:
//!
//! - **Schedules** steps into dependency stages and rejects cycles up front
//! - **Fans out** each stage across repositories with bounded concurrency
//! - **Guards** every mutation with hard-stop and soft-skip safeguards
//! - **Stages only its own edits**, tracked in a per-repository ledger
//! - **Reports** one outcome per (repository, step) plus a run summary
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fleetflow::prelude::*;
//!
//! let plan = WorkflowPlan::from_yaml_str(source, &vars)?;
//! let engine = Engine::new(RunConfig::default().with_concurrency(4));
//! let summary = engine.run(plan, &[PathBuf::from("~/src")]).await?;
//! println!("{} applied, {} skipped", summary.applied, summary.skipped);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod capture;
pub mod config;
pub mod confirm;
pub mod context;
pub mod core;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod executor;
pub mod observability;
pub mod operations;
pub mod presets;
pub mod runner;
pub mod safeguards;
pub mod tasks;
pub mod template;
pub mod testing;
pub mod workflow;

pub use engine::Engine;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::RunConfig;
    pub use crate::confirm::{ConfirmationSession, Prompter, StdinPrompter};
    pub use crate::context::{MutationLedger, RepoLog, RepositoryContext};
    pub use crate::core::{ExecutionOutcome, OutcomeCode, OutcomeStatus};
    pub use crate::discovery::{FsDiscovery, RepositoryDiscovery, StaticDiscovery};
    pub use crate::engine::Engine;
    pub use crate::errors::{
        CommandError, CyclicDependencyError, FleetflowError, PlanError, PlanErrorInfo,
        PlanValidationError, RunError, UnknownStepReferenceError,
    };
    pub use crate::events::{EventSink, JsonLinesEventSink, LoggingEventSink, NoOpEventSink, RunEvent};
    pub use crate::exec::{CommandExecutor, ProcessExecutor};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::operations::{Operation, OperationRegistry, OperationScope, StepContext};
    pub use crate::runner::{RunCoordinator, RunSummary, StepRecord};
    pub use crate::safeguards::{Conditions, Safeguards};
    pub use crate::tasks::TaskDefinition;
    pub use crate::workflow::{PreparedPlan, Stage, StageScheduler, Step, WorkflowPlan};
}
