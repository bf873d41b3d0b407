//! `${name}` / `${name:-default}` substitution on raw plan text.

use crate::errors::PlanValidationError;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

const VAR_PATTERN: &str = r"\$\{([A-Za-z_][A-Za-z0-9_.-]*)(?::-([^}]*))?\}";

/// Replaces every `${name}` with its runtime value.
///
/// `${name:-fallback}` uses the fallback when the variable is unset. A
/// reference with neither a value nor a fallback is a plan error.
pub fn substitute_vars(
    source: &str,
    vars: &BTreeMap<String, String>,
) -> Result<String, PlanValidationError> {
    let pattern =
        Regex::new(VAR_PATTERN).map_err(|e| PlanValidationError::invalid_document(e.to_string()))?;
    let mut missing = None;
    let replaced = pattern.replace_all(source, |caps: &Captures<'_>| {
        let name = &caps[1];
        match (vars.get(name), caps.get(2)) {
            (Some(value), _) => value.clone(),
            (None, Some(fallback)) => fallback.as_str().to_string(),
            (None, None) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(PlanValidationError::undefined_variable(&name)),
        None => Ok(replaced.into_owned()),
    }
}
