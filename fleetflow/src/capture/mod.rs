//! Capture/restore store.
//!
//! Lets a workflow remember a branch or commit in one repository and return
//! to it later in the same run.

mod actions;
mod store;

pub use actions::{capture_current, restore_captured};
pub use store::{CaptureKind, CaptureSpec, CaptureStore, CaptureWrite, CapturedValue, RestoreSpec};
