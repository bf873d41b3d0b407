//! Workflow plan documents.

use super::{normalize_steps, substitute_vars, Stage, StageScheduler};
use crate::errors::{PlanError, PlanValidationError};
use crate::operations::{parse_options, OperationRegistry, OperationScope};
use crate::presets;
use crate::safeguards::Safeguards;
use crate::tasks::TaskDefinition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Command path that runs a task pipeline instead of a registered operation.
pub const TASK_COMMAND: &str = "task";

/// One named command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Step name; filled in by normalization when omitted.
    #[serde(default)]
    pub name: String,
    /// Command path (`task`, `repo.rename`, ...).
    pub command: String,
    /// Steps this one runs after.
    #[serde(default)]
    pub after: Vec<String>,
    /// Step-level safeguards.
    #[serde(default)]
    pub safeguards: Safeguards,
    /// Option bag for the target operation.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl Step {
    /// Creates an unnamed step.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            command: command.into(),
            after: Vec::new(),
            safeguards: Safeguards::default(),
            options: serde_json::Value::Null,
        }
    }

    /// Creates a step running a task.
    pub fn task(task: impl Into<String>) -> Self {
        Self::new(TASK_COMMAND).with_options(serde_json::json!({ "task": task.into() }))
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_after(mut self, dependency: impl Into<String>) -> Self {
        self.after.push(dependency.into());
        self
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    /// Sets step-level safeguards.
    #[must_use]
    pub fn with_safeguards(mut self, safeguards: Safeguards) -> Self {
        self.safeguards = safeguards;
        self
    }

    /// Whether this step runs a task pipeline.
    #[must_use]
    pub fn is_task(&self) -> bool {
        self.command == TASK_COMMAND
    }
}

/// Options of a `task` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskStepOptions {
    /// Name of the task under the plan's `tasks` map.
    pub task: String,
}

/// A parsed plan document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowPlan {
    /// Plan name.
    #[serde(default)]
    pub name: String,
    /// Template variables declared by the plan.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Task definitions by name.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskDefinition>,
    /// Steps in declaration order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl WorkflowPlan {
    /// Creates an empty plan.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a step.
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Adds a task definition.
    #[must_use]
    pub fn with_task(mut self, name: impl Into<String>, task: TaskDefinition) -> Self {
        self.tasks.insert(name.into(), task);
        self
    }

    /// Parses a YAML (or JSON) document after substituting runtime variables.
    pub fn from_yaml_str(
        source: &str,
        runtime_vars: &BTreeMap<String, String>,
    ) -> Result<Self, PlanError> {
        let source = substitute_vars(source, runtime_vars)?;
        serde_yaml::from_str(&source)
            .map_err(|e| PlanValidationError::invalid_document(e.to_string()).into())
    }

    /// Loads an embedded preset by name.
    pub fn from_preset(
        name: &str,
        runtime_vars: &BTreeMap<String, String>,
    ) -> Result<Self, PlanError> {
        let source = presets::get(name).ok_or_else(|| {
            PlanValidationError::invalid_document(format!(
                "unknown preset '{name}' (available: {})",
                presets::names().join(", ")
            ))
        })?;
        Self::from_yaml_str(source, runtime_vars)
    }

    /// Normalizes, validates against the registry and schedules the plan.
    pub fn prepare(mut self, registry: &OperationRegistry) -> Result<PreparedPlan, PlanError> {
        normalize_steps(&mut self.steps)?;
        let scopes = self.validate_commands(registry)?;
        let stages = StageScheduler::new().schedule(&self.steps)?;

        Ok(PreparedPlan {
            name: self.name,
            vars: self.vars,
            tasks: Arc::new(self.tasks),
            steps: self
                .steps
                .into_iter()
                .map(|step| (step.name.clone(), Arc::new(step)))
                .collect(),
            scopes,
            stages,
        })
    }

    fn validate_commands(
        &self,
        registry: &OperationRegistry,
    ) -> Result<HashMap<String, OperationScope>, PlanError> {
        let mut scopes = HashMap::with_capacity(self.steps.len());
        for step in &self.steps {
            let scope = if step.is_task() {
                let options: TaskStepOptions = parse_options(TASK_COMMAND, &step.options)
                    .map_err(|e| {
                        PlanValidationError::new(format!("Step '{}': {e}", step.name))
                            .with_steps(vec![step.name.clone()])
                    })?;
                if !self.tasks.contains_key(&options.task) {
                    return Err(PlanValidationError::unknown_task(&step.name, &options.task).into());
                }
                OperationScope::Repository
            } else {
                registry.scope_of(&step.command).ok_or_else(|| {
                    PlanValidationError::unknown_command(&step.name, &step.command)
                })?
            };
            scopes.insert(step.name.clone(), scope);
        }
        Ok(scopes)
    }
}

/// A normalized, validated and scheduled plan, ready to run.
#[derive(Debug, Clone)]
pub struct PreparedPlan {
    /// Plan name.
    pub name: String,
    /// Plan variables.
    pub vars: BTreeMap<String, String>,
    /// Task definitions.
    pub tasks: Arc<BTreeMap<String, TaskDefinition>>,
    steps: HashMap<String, Arc<Step>>,
    scopes: HashMap<String, OperationScope>,
    /// Stages in execution order.
    pub stages: Vec<Stage>,
}

impl PreparedPlan {
    /// Looks up a step by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&Arc<Step>> {
        self.steps.get(name)
    }

    /// Scope of a step.
    #[must_use]
    pub fn scope(&self, name: &str) -> OperationScope {
        self.scopes
            .get(name)
            .copied()
            .unwrap_or(OperationScope::Repository)
    }

    /// Number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}
