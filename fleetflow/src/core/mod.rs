//! Core outcome types shared by every layer of the engine.

mod outcome;
mod status;

pub use outcome::{ActionRecord, ExecutionOutcome, Outcome, SkipScope};
pub use status::{OutcomeCode, OutcomeStatus};
