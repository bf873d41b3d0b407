//! Run-wide cooperative cancellation.

mod token;

pub use token::CancellationToken;
