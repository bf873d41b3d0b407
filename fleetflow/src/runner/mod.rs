//! Run coordination across repositories.

mod coordinator;
mod summary;

mod integration_tests;

pub use coordinator::RunCoordinator;
pub use summary::{RunSummary, StepRecord};
