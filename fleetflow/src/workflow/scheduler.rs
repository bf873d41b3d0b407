//! Stage scheduling over the step dependency graph.

use super::Step;
use crate::errors::{CyclicDependencyError, PlanError, UnknownStepReferenceError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A set of steps whose dependencies all live in earlier stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Zero-based position in the run.
    pub index: usize,
    /// Step names, in declaration order.
    pub steps: Vec<String>,
}

/// Groups steps into stages with Kahn's algorithm.
#[derive(Debug, Default, Clone, Copy)]
pub struct StageScheduler;

impl StageScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Schedules normalized steps.
    ///
    /// Every round takes all steps whose dependencies are already placed,
    /// keeping declaration order within the round. A plan that cannot be
    /// fully placed contains a cycle and produces no stages at all.
    pub fn schedule(&self, steps: &[Step]) -> Result<Vec<Stage>, PlanError> {
        let known: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();
        for step in steps {
            if let Some(missing) = step.after.iter().find(|dep| !known.contains(dep.as_str())) {
                return Err(UnknownStepReferenceError::new(&step.name, missing).into());
            }
        }

        let mut placed: HashSet<&str> = HashSet::with_capacity(steps.len());
        let mut stages = Vec::new();

        while placed.len() < steps.len() {
            let ready: Vec<&Step> = steps
                .iter()
                .filter(|s| !placed.contains(s.name.as_str()))
                .filter(|s| s.after.iter().all(|dep| placed.contains(dep.as_str())))
                .collect();

            if ready.is_empty() {
                let cycle = find_cycle(steps).unwrap_or_else(|| {
                    steps
                        .iter()
                        .filter(|s| !placed.contains(s.name.as_str()))
                        .map(|s| s.name.clone())
                        .collect()
                });
                return Err(CyclicDependencyError::new(cycle).into());
            }

            for step in &ready {
                placed.insert(step.name.as_str());
            }
            stages.push(Stage {
                index: stages.len(),
                steps: ready.iter().map(|s| s.name.clone()).collect(),
            });
        }

        tracing::debug!(stages = stages.len(), steps = steps.len(), "Scheduled plan");
        Ok(stages)
    }
}

fn find_cycle(steps: &[Step]) -> Option<Vec<String>> {
    let graph: HashMap<&str, &[String]> = steps
        .iter()
        .map(|s| (s.name.as_str(), s.after.as_slice()))
        .collect();

    let mut visited = HashSet::new();
    for step in steps {
        if visited.contains(step.name.as_str()) {
            continue;
        }
        let mut on_path = HashSet::new();
        let mut path = Vec::new();
        if let Some(cycle) = dfs_cycle(&graph, &step.name, &mut visited, &mut on_path, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn dfs_cycle(
    graph: &HashMap<&str, &[String]>,
    node: &str,
    visited: &mut HashSet<String>,
    on_path: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    on_path.insert(node.to_string());
    path.push(node.to_string());

    for dep in graph.get(node).copied().unwrap_or_default() {
        if !visited.contains(dep) {
            if let Some(cycle) = dfs_cycle(graph, dep, visited, on_path, path) {
                return Some(cycle);
            }
        } else if on_path.contains(dep) {
            let start = path.iter().position(|n| n == dep)?;
            let mut cycle = path[start..].to_vec();
            cycle.push(dep.clone());
            return Some(cycle);
        }
    }

    path.pop();
    on_path.remove(node);
    None
}
