//! Operation registry.

use super::builtin;
use super::{Operation, OperationScope};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps command paths to operations.
#[derive(Default, Clone)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in operation.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(builtin::RenamePath));
        registry.register(Arc::new(builtin::StageCommit));
        registry.register(Arc::new(builtin::RemoteProtocolOp));
        registry.register(Arc::new(builtin::CaptureRef));
        registry.register(Arc::new(builtin::RestoreRef));
        registry.register(Arc::new(builtin::AuditReport));
        registry
    }

    /// Registers an operation under its key, replacing any previous one.
    pub fn register(&mut self, operation: Arc<dyn Operation>) {
        self.operations
            .insert(operation.key().to_string(), operation);
    }

    /// Looks up an operation by exact key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(key).cloned()
    }

    /// Checks if an operation is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.operations.contains_key(key)
    }

    /// Scope of a registered operation.
    #[must_use]
    pub fn scope_of(&self, key: &str) -> Option<OperationScope> {
        self.operations.get(key).map(|op| op.scope())
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.operations.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.keys())
            .finish()
    }
}
