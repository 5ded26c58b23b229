//! Typed registration table mapping resource paths to handlers

use crate::{Error, ResourceHandler, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Path -> handler table consulted by a transport's dispatch context
#[derive(Default)]
pub struct ResourceTable {
    handlers: RwLock<HashMap<String, ResourceHandler>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `path`
    ///
    /// Paths are unique; registering the same path twice is an error.
    pub fn insert(&self, path: &str, handler: ResourceHandler) -> Result<()> {
        if path.is_empty() || path.starts_with('/') {
            return Err(Error::Registration(format!("Invalid resource path '{path}'")));
        }

        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| Error::Registration("resource table lock poisoned".to_string()))?;

        if handlers.contains_key(path) {
            return Err(Error::Registration(format!("Resource '{path}' already registered")));
        }
        handlers.insert(path.to_string(), handler);
        Ok(())
    }

    /// Look up the handler for `path`
    ///
    /// The handler is cloned out so it runs without holding the table lock.
    pub fn get(&self, path: &str) -> Option<ResourceHandler> {
        self.handlers.read().ok()?.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .handlers
            .read()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
