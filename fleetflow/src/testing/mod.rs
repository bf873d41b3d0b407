//! Testing utilities for fleetflow runs.
//!
//! This module provides:
//! - A scripted command executor that records calls and counts overlap
//! - A scripted prompter and a recording operation
//! - Fixtures for services, step contexts and repository sets
//! - Assertions for execution outcomes

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_outcome_applied, assert_outcome_code, assert_outcome_failed, assert_outcome_skipped,
    assert_reason_contains,
};
pub use mocks::{RecordingOperation, ScriptedExecutor, ScriptedPrompter};
