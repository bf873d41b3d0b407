//! Filesystem discovery.

use super::RepositoryDiscovery;
use crate::errors::FleetflowError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Walks the roots looking for directories that contain `.git`.
///
/// Never descends into `.git` or into a repository once found, so nested
/// checkouts (vendored repositories, submodules) are not reported twice.
#[derive(Debug, Clone, Copy)]
pub struct FsDiscovery {
    max_depth: usize,
}

impl Default for FsDiscovery {
    fn default() -> Self {
        Self::new(4)
    }
}

impl FsDiscovery {
    /// Creates a walker that looks at most `max_depth` levels below each root.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    fn walk(root: &Path, max_depth: usize) -> Result<Vec<PathBuf>, FleetflowError> {
        if !root.is_dir() {
            return Err(FleetflowError::Discovery(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut found = Vec::new();
        let mut entries = WalkDir::new(root)
            .max_depth(max_depth)
            .follow_links(false)
            .into_iter();

        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.file_name() == ".git" {
                entries.skip_current_dir();
                continue;
            }
            if entry.path().join(".git").exists() {
                debug!(repo = %entry.path().display(), "Found repository");
                found.push(entry.path().to_path_buf());
                entries.skip_current_dir();
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl RepositoryDiscovery for FsDiscovery {
    async fn discover(&self, roots: &[PathBuf]) -> Result<Vec<PathBuf>, FleetflowError> {
        let roots = roots.to_vec();
        let max_depth = self.max_depth;
        let mut found = tokio::task::spawn_blocking(move || {
            roots.iter().try_fold(Vec::new(), |mut acc, root| {
                acc.extend(Self::walk(root, max_depth)?);
                Ok::<_, FleetflowError>(acc)
            })
        })
        .await
        .map_err(|e| FleetflowError::Discovery(e.to_string()))??;

        found.sort();
        found.dedup();
        Ok(found)
    }
}

/// Returns a fixed list of paths.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    paths: Vec<PathBuf>,
}

impl StaticDiscovery {
    /// Creates a discovery that always answers `paths`.
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RepositoryDiscovery for StaticDiscovery {
    async fn discover(&self, _roots: &[PathBuf]) -> Result<Vec<PathBuf>, FleetflowError> {
        let mut paths = self.paths.clone();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::repository_tree;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_finds_repositories_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let mut expected = repository_tree(dir.path(), &["zeta", "alpha", "group/beta"]).unwrap();
        std::fs::create_dir_all(dir.path().join("plain/dir")).unwrap();
        expected.sort();

        let found = FsDiscovery::default()
            .discover(&[dir.path().to_path_buf(), dir.path().to_path_buf()])
            .await
            .unwrap();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn test_does_not_descend_into_repositories() {
        let dir = tempfile::tempdir().unwrap();
        repository_tree(dir.path(), &["outer", "outer/vendor/inner"]).unwrap();

        let found = FsDiscovery::default()
            .discover(&[dir.path().to_path_buf()])
            .await
            .unwrap();
        assert_eq!(found, vec![dir.path().join("outer")]);
    }

    #[tokio::test]
    async fn test_depth_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        repository_tree(dir.path(), &["a/b/c/d/deep", "shallow"]).unwrap();

        let found = FsDiscovery::new(2)
            .discover(&[dir.path().to_path_buf()])
            .await
            .unwrap();
        assert_eq!(found, vec![dir.path().join("shallow")]);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsDiscovery::default()
            .discover(&[dir.path().join("nope")])
            .await
            .unwrap_err();
        assert!(matches!(err, FleetflowError::Discovery(_)));
    }

    #[test]
    fn test_static_discovery() {
        let discovery = StaticDiscovery::new([PathBuf::from("/b"), PathBuf::from("/a"), PathBuf::from("/b")]);
        let found = tokio_test::block_on(discovery.discover(&[])).unwrap();
        assert_eq!(found, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }
}
