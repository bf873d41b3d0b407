//! Step normalization: default names, duplicate detection, implicit ordering.

use super::Step;
use crate::errors::PlanValidationError;
use std::collections::HashSet;

/// Name given to a step declared without one (`index` is 1-based).
#[must_use]
pub fn default_step_name(index: usize, command: &str) -> String {
    format!("step-{index}-{}", command.replace('.', "-"))
}

/// Fills in missing names and makes the declaration order explicit.
///
/// A step without `after` runs after the step declared before it, so a plan
/// with no edges at all is a plain sequence.
pub fn normalize_steps(steps: &mut [Step]) -> Result<(), PlanValidationError> {
    for (index, step) in steps.iter_mut().enumerate() {
        let trimmed = step.name.trim();
        step.name = if trimmed.is_empty() {
            default_step_name(index + 1, &step.command)
        } else {
            trimmed.to_string()
        };
    }

    let mut seen = HashSet::with_capacity(steps.len());
    for step in steps.iter() {
        if !seen.insert(step.name.as_str()) {
            return Err(PlanValidationError::duplicate_step(&step.name));
        }
    }

    for index in 1..steps.len() {
        if steps[index].after.is_empty() {
            let previous = steps[index - 1].name.clone();
            steps[index].after.push(previous);
        }
    }
    Ok(())
}
