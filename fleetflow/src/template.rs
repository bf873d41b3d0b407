//! Template rendering for branch names, commit messages and file content.

use crate::context::RepositoryContext;
use crate::errors::FleetflowError;
use minijinja::{Environment, UndefinedBehavior};
use std::collections::BTreeMap;

/// Renders `{{ ... }}` templates with strict undefined handling.
#[derive(Debug)]
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Creates an engine that keeps trailing newlines and rejects undefined names.
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self { env }
    }

    /// Renders a template string.
    pub fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, FleetflowError> {
        if !template.contains("{{") && !template.contains("{%") {
            return Ok(template.to_string());
        }
        Ok(self.env.render_str(template, context)?)
    }
}

/// Builds the template context for one repository.
///
/// Variables are available both at the top level and under `vars`; `repo`
/// and `task` are reserved.
#[must_use]
pub fn template_context(
    repo: &RepositoryContext,
    vars: &BTreeMap<String, String>,
    task: Option<&str>,
) -> serde_json::Value {
    let mut root = serde_json::Map::new();
    for (key, value) in vars {
        root.insert(key.clone(), serde_json::Value::String(value.clone()));
    }
    root.insert("vars".to_string(), serde_json::json!(vars));
    root.insert("repo".to_string(), repo.template_value());
    if let Some(task) = task {
        root.insert("task".to_string(), serde_json::Value::String(task.to_string()));
    }
    serde_json::Value::Object(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> serde_json::Value {
        let repo = RepositoryContext::new("/src/widgets")
            .with_slug("acme", "widgets")
            .with_default_branch("trunk");
        let vars = BTreeMap::from([("year".to_string(), "2025".to_string())]);
        template_context(&repo, &vars, Some("license"))
    }

    #[test]
    fn test_render_repo_and_vars() {
        let engine = TemplateEngine::new();
        let out = engine
            .render("{{ task }}/{{ year }} on {{ repo.slug }} from {{ repo.default_branch }}", &context())
            .unwrap();
        assert_eq!(out, "license/2025 on acme/widgets from trunk");
        assert_eq!(engine.render("{{ vars.year }}", &context()).unwrap(), "2025");
    }

    #[test]
    fn test_keeps_trailing_newline() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("{{ year }}\n", &context()).unwrap(), "2025\n");
    }

    #[test]
    fn test_undefined_is_error() {
        let engine = TemplateEngine::new();
        let err = engine.render("{{ missing }}", &context()).unwrap_err();
        assert!(matches!(err, FleetflowError::Template(_)));
    }

    #[test]
    fn test_plain_text_passthrough() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("no templates here", &serde_json::json!({})).unwrap(), "no templates here");
    }
}
