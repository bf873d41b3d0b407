//! Tracing subscriber setup.

mod logging;

pub use logging::{init_tracing, run_span, LogFormat, DEFAULT_FILTER};
