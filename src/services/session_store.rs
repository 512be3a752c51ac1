use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Session-scoped storage private to one context.
///
/// Survives a reload of the context (the same store is handed to the new
/// registry) but is never shared with other contexts.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory session storage. Cloning yields a handle to the same session.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_session() {
        let session = MemorySessionStore::new();
        let reloaded = session.clone();

        session.set("windowId", "a1").unwrap();
        assert_eq!(reloaded.get("windowId").unwrap().as_deref(), Some("a1"));

        let other_tab = MemorySessionStore::new();
        assert_eq!(other_tab.get("windowId").unwrap(), None);
    }
}
