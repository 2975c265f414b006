//! Action registry for routing requests to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ActionErrorKind, GatewayError};

use super::traits::Action;

/// Registry of routable actions keyed by path.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. Paths are unique.
    pub fn register(&mut self, action: Arc<dyn Action>) -> Result<(), GatewayError> {
        let path = action.path().to_lowercase();
        if self.actions.contains_key(&path) {
            return Err(GatewayError::Action {
                kind: ActionErrorKind::DuplicateAction { path },
            });
        }

        debug!(action = %path, "Registering action");
        self.actions.insert(path, action);
        Ok(())
    }

    /// Get an action by path.
    pub fn get(&self, path: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(path).cloned()
    }

    /// Check if an action exists.
    pub fn contains(&self, path: &str) -> bool {
        self.actions.contains_key(path)
    }

    /// List all registered paths, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
