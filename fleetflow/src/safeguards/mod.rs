//! Safeguard specification and evaluation.
//!
//! Safeguards come in two classes: hard-stop conditions halt every remaining
//! step for a repository, soft-skip conditions skip only the current action
//! or step.

mod conditions;
mod evaluator;

pub use conditions::{Classification, Conditions, Safeguards};
pub use evaluator::{Checkpoint, Condition, Evaluation, Gate, SafeguardEvaluator, Verdict};
