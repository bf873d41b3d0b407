//! Step dispatch.

mod step;

pub use step::StepExecutor;
