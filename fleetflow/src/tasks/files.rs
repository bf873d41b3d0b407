//! File edits for the files-apply action.

use super::{EditMode, FileEdit};
use crate::errors::FleetflowError;
use crate::template::TemplateEngine;
use glob::Pattern;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// What an edit pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesReport {
    /// Repository-relative paths whose content changed (or would change in a dry run).
    pub changed: Vec<PathBuf>,
    /// Targets that already had the desired content.
    pub unchanged: Vec<PathBuf>,
}

impl FilesReport {
    fn note(&mut self, path: PathBuf, changed: bool) {
        let list = if changed { &mut self.changed } else { &mut self.unchanged };
        if !list.contains(&path) {
            list.push(path);
        }
    }
}

/// Appends every template line the content lacks; `None` when nothing is missing.
///
/// Lines match exactly (whitespace included, trailing `\r` ignored), so `.env`
/// is not satisfied by `.envrc`. Blank template lines are ignored.
#[must_use]
pub fn append_if_missing(existing: &str, template: &str) -> Option<String> {
    let strip_cr = |line: &str| line.strip_suffix('\r').unwrap_or(line).to_string();
    let present: HashSet<String> = existing.lines().map(strip_cr).collect();

    let mut missing: Vec<String> = Vec::new();
    for line in template.lines().map(strip_cr) {
        if line.trim().is_empty() || present.contains(&line) || missing.contains(&line) {
            continue;
        }
        missing.push(line);
    }

    if missing.is_empty() {
        return None;
    }

    let mut out = existing.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    for line in missing {
        out.push_str(&line);
        out.push('\n');
    }
    Some(out)
}

/// Applies edits under `root`, rendering templates with `context`.
///
/// In a dry run nothing is written, but the report still lists what would change.
pub fn apply_edits(
    root: &Path,
    edits: &[FileEdit],
    templates: &TemplateEngine,
    context: &serde_json::Value,
    dry_run: bool,
) -> Result<FilesReport, FleetflowError> {
    let mut report = FilesReport::default();

    for edit in edits {
        match edit.mode {
            EditMode::Overwrite | EditMode::SkipIfExists | EditMode::AppendIfMissing => {
                let relative = checked_relative(&templates.render(required(edit.path.as_deref(), "path", edit.mode)?, context)?)?;
                let content = templates.render(required(edit.content.as_deref(), "content", edit.mode)?, context)?;
                let target = root.join(&relative);
                let current = read_optional(&target)?;

                let desired = match (edit.mode, current.as_deref()) {
                    (EditMode::SkipIfExists, Some(_)) => None,
                    (EditMode::AppendIfMissing, existing) => append_if_missing(existing.unwrap_or(""), &content),
                    (_, Some(existing)) if existing == content => None,
                    _ => Some(content),
                };

                match desired {
                    Some(new_content) => {
                        if !dry_run {
                            write_file(&target, &new_content)?;
                        }
                        report.note(relative, true);
                    }
                    None => report.note(relative, false),
                }
            }
            EditMode::Replace => {
                let find = required(edit.find.as_deref(), "find", edit.mode)?;
                let replacement = templates.render(edit.replace.as_deref().unwrap_or(""), context)?;
                let matcher = if edit.regex {
                    Some(Regex::new(find).map_err(|e| invalid(format!("bad regex '{find}': {e}")))?)
                } else {
                    None
                };

                for relative in replace_targets(root, edit, templates, context)? {
                    let target = root.join(&relative);
                    let Ok(current) = fs::read_to_string(&target) else {
                        warn!(path = %target.display(), "Skipping file that is not valid UTF-8");
                        continue;
                    };
                    let updated = match &matcher {
                        Some(re) => re.replace_all(&current, replacement.as_str()).into_owned(),
                        None => current.replace(find, &replacement),
                    };
                    let changed = updated != current;
                    if changed && !dry_run {
                        write_file(&target, &updated)?;
                    }
                    report.note(relative, changed);
                }
            }
        }
    }

    Ok(report)
}

fn replace_targets(
    root: &Path,
    edit: &FileEdit,
    templates: &TemplateEngine,
    context: &serde_json::Value,
) -> Result<Vec<PathBuf>, FleetflowError> {
    if let Some(path) = &edit.path {
        let relative = checked_relative(&templates.render(path, context)?)?;
        return Ok(if root.join(&relative).is_file() {
            vec![relative]
        } else {
            Vec::new()
        });
    }

    let pattern = edit
        .glob
        .as_deref()
        .ok_or_else(|| invalid("replace needs `path` or `glob`".to_string()))?;
    checked_relative(pattern)?;

    let full = format!(
        "{}/{}",
        Pattern::escape(&root.to_string_lossy()),
        pattern.trim_start_matches("./")
    );
    let entries = glob::glob(&full).map_err(|e| invalid(format!("bad glob '{pattern}': {e}")))?;

    let mut targets = Vec::new();
    for entry in entries {
        let path = entry.map_err(std::io::Error::from)?;
        if !path.is_file() {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(root) {
            if relative.components().any(|c| c.as_os_str() == ".git") {
                continue;
            }
            targets.push(relative.to_path_buf());
        }
    }
    targets.sort();
    Ok(targets)
}

fn required<'a>(value: Option<&'a str>, field: &str, mode: EditMode) -> Result<&'a str, FleetflowError> {
    value.ok_or_else(|| invalid(format!("`{field}` is required for mode {mode:?}")))
}

fn invalid(message: String) -> FleetflowError {
    FleetflowError::InvalidOptions {
        command: "files-apply".to_string(),
        message,
    }
}

fn checked_relative(raw: &str) -> Result<PathBuf, FleetflowError> {
    relative_path("files-apply", raw)
}

/// Rejects absolute paths and paths escaping the repository.
pub(crate) fn relative_path(command: &str, raw: &str) -> Result<PathBuf, FleetflowError> {
    let path = PathBuf::from(raw);
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if raw.is_empty() || escapes {
        return Err(FleetflowError::InvalidOptions {
            command: command.to_string(),
            message: format!("path '{raw}' must stay inside the repository"),
        });
    }
    Ok(path)
}

fn read_optional(path: &Path) -> Result<Option<String>, FleetflowError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), FleetflowError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn apply(root: &Path, edits: &[FileEdit]) -> FilesReport {
        apply_edits(root, edits, &TemplateEngine::new(), &json!({"year": "2025"}), false).unwrap()
    }

    #[test]
    fn test_append_if_missing_exact_lines() {
        let existing = ".envrc\nnode_modules\n";
        let out = append_if_missing(existing, ".env\nnode_modules\n").unwrap();
        assert_eq!(out, ".envrc\nnode_modules\n.env\n");
    }

    #[test]
    fn test_append_if_missing_idempotent() {
        let template = ".env\n  indented\n\n.env\n";
        let once = append_if_missing("target\n", template).unwrap();
        assert_eq!(once, "target\n.env\n  indented\n");
        assert_eq!(append_if_missing(&once, template), None);
    }

    #[test]
    fn test_append_if_missing_adds_separator_newline() {
        assert_eq!(append_if_missing("a", "b").unwrap(), "a\nb\n");
        assert_eq!(append_if_missing("", "b").unwrap(), "b\n");
        assert_eq!(append_if_missing("b\r\n", "b"), None);
    }

    #[test]
    fn test_overwrite_and_skip_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "old").unwrap();

        let report = apply(
            dir.path(),
            &[
                FileEdit::overwrite("docs/LICENSE", "Copyright {{ year }}\n"),
                FileEdit::skip_if_exists("README.md", "new"),
            ],
        );

        assert_eq!(report.changed, vec![PathBuf::from("docs/LICENSE")]);
        assert_eq!(report.unchanged, vec![PathBuf::from("README.md")]);
        assert_eq!(fs::read_to_string(dir.path().join("docs/LICENSE")).unwrap(), "Copyright 2025\n");
        assert_eq!(fs::read_to_string(dir.path().join("README.md")).unwrap(), "old");

        let again = apply(dir.path(), &[FileEdit::overwrite("docs/LICENSE", "Copyright {{ year }}\n")]);
        assert!(again.changed.is_empty());
    }

    #[test]
    fn test_append_edit_twice_yields_same_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), ".envrc\n").unwrap();
        let edit = [FileEdit::append_if_missing(".gitignore", ".env\n")];

        let first = apply(dir.path(), &edit);
        let after_first = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        let second = apply(dir.path(), &edit);
        let after_second = fs::read_to_string(dir.path().join(".gitignore")).unwrap();

        assert_eq!(first.changed.len(), 1);
        assert!(second.changed.is_empty());
        assert_eq!(after_first, ".envrc\n.env\n");
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_recursive_glob_replace() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.md"), "(c) 2024").unwrap();
        fs::write(dir.path().join("a/b/deep.md"), "2024 and 2024").unwrap();
        fs::write(dir.path().join("a/skip.txt"), "2024").unwrap();
        fs::write(dir.path().join("a/same.md"), "nothing").unwrap();

        let report = apply(dir.path(), &[FileEdit::replace_in("**/*.md", "2024", "{{ year }}")]);

        assert_eq!(report.changed, vec![PathBuf::from("a/b/deep.md"), PathBuf::from("top.md")]);
        assert_eq!(report.unchanged, vec![PathBuf::from("a/same.md")]);
        assert_eq!(fs::read_to_string(dir.path().join("a/b/deep.md")).unwrap(), "2025 and 2025");
        assert_eq!(fs::read_to_string(dir.path().join("a/skip.txt")).unwrap(), "2024");
    }

    #[test]
    fn test_glob_skips_directories_and_git() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("notes.md")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD.md"), "2024").unwrap();
        fs::write(dir.path().join("real.md"), "2024").unwrap();

        let report = apply(dir.path(), &[FileEdit::replace_in("**/*.md", "2024", "{{ year }}")]);

        assert_eq!(report.changed, vec![PathBuf::from("real.md")]);
        assert_eq!(fs::read_to_string(dir.path().join(".git/HEAD.md")).unwrap(), "2024");
    }

    #[test]
    fn test_regex_replace() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Cargo.toml"), "version = \"0.1.0\"\n").unwrap();
        let mut edit = FileEdit::replace_in("Cargo.toml", r#"version = "[^"]+""#, r#"version = "0.2.0""#);
        edit.regex = true;

        apply(dir.path(), &[edit]);
        assert_eq!(fs::read_to_string(dir.path().join("Cargo.toml")).unwrap(), "version = \"0.2.0\"\n");
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let report = apply_edits(
            dir.path(),
            &[FileEdit::overwrite("new.txt", "x")],
            &TemplateEngine::new(),
            &json!({}),
            true,
        )
        .unwrap();
        assert_eq!(report.changed, vec![PathBuf::from("new.txt")]);
        assert!(!dir.path().join("new.txt").exists());
    }

    #[test]
    fn test_paths_must_stay_inside_repository() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["../escape.txt", "/etc/passwd"] {
            let err = apply_edits(
                dir.path(),
                &[FileEdit::overwrite(bad, "x")],
                &TemplateEngine::new(),
                &json!({}),
                false,
            )
            .unwrap_err();
            assert!(matches!(err, FleetflowError::InvalidOptions { .. }));
        }
    }
}
