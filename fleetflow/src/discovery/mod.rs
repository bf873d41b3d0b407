//! Finding repositories on disk.

mod fs;

pub use fs::{FsDiscovery, StaticDiscovery};

use crate::errors::FleetflowError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Turns search roots into repository paths.
#[async_trait]
pub trait RepositoryDiscovery: Send + Sync {
    /// Returns every repository under `roots`, sorted and de-duplicated.
    async fn discover(&self, roots: &[PathBuf]) -> Result<Vec<PathBuf>, FleetflowError>;
}
