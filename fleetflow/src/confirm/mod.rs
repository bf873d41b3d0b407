//! Run-wide confirmation session for destructive actions.

mod session;

pub use session::{
    parse_answer, Confirmation, ConfirmMode, ConfirmationSession, PromptAnswer, Prompter,
    StdinPrompter,
};
