//! Workflow plans and stage scheduling.
//!
//! A plan is parsed from YAML (after `${var}` substitution), normalized once
//! (default names, implicit `after` edges), validated against the operation
//! registry and partitioned into stages.

mod normalize;
mod plan;
mod scheduler;
mod vars;

pub use normalize::{default_step_name, normalize_steps};
pub use plan::{PreparedPlan, Step, TaskStepOptions, WorkflowPlan, TASK_COMMAND};
pub use scheduler::{Stage, StageScheduler};
pub use vars::substitute_vars;
