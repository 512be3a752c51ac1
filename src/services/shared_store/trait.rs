use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::events::StorageEvent;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::dry_run::DryRunSharedStore;
use super::file::FileSharedStore;
use super::memory::MemoryHub;

/// Shared key-value storage visible to every context of the same origin.
///
/// Writes are plain overwrites (last writer wins). Change notifications are
/// delivered to subscriptions of *other* contexts only; a context never sees
/// its own writes echoed back.
pub trait SharedStore: Send + Sync {
    /// Read the raw value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the value under `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key` if present
    fn remove(&self, key: &str) -> Result<()>;

    /// Delete every key
    fn clear(&self) -> Result<()>;

    /// Subscribe to changes made by other contexts
    fn subscribe(&self) -> Result<StoreSubscription>;
}

/// Live subscription to storage change notifications.
///
/// Dropping the subscription unregisters it from the backend.
pub struct StoreSubscription {
    receiver: mpsc::UnboundedReceiver<StorageEvent>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl StoreSubscription {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<StorageEvent>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Next pending notification without waiting
    pub fn try_recv(&mut self) -> Option<StorageEvent> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the next notification. `None` means the backend went away
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        self.receiver.recv().await
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for StoreSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSubscription").finish_non_exhaustive()
    }
}

/// Factory function to create the shared store of one context based on the
/// configured backend and the dry_run flag
pub fn create_shared_store(
    config: &Config,
    hub: &MemoryHub,
    dry_run: bool,
) -> Result<Arc<dyn SharedStore>> {
    let store: Arc<dyn SharedStore> = match config.storage.backend.as_str() {
        "memory" => Arc::new(hub.connect()),
        "file" => Arc::new(FileSharedStore::open(&config.storage.directory)?),
        other => {
            return Err(SyncError::Internal(format!(
                "Неизвестный бэкенд хранилища: {}",
                other
            )))
        }
    };

    if dry_run {
        Ok(Arc::new(DryRunSharedStore::new(store)))
    } else {
        Ok(store)
    }
}
