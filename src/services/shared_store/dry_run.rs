use crate::error::Result;
use std::sync::Arc;
use tracing::info;

use super::r#trait::{SharedStore, StoreSubscription};

/// Обёртка режима сухого запуска: чтение и подписка проходят насквозь,
/// записи только логируются
pub struct DryRunSharedStore {
    inner: Arc<dyn SharedStore>,
}

impl DryRunSharedStore {
    pub fn new(inner: Arc<dyn SharedStore>) -> Self {
        info!("Dry-run режим - записи в общее хранилище отключены");
        Self { inner }
    }
}

impl SharedStore for DryRunSharedStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        info!("[DRY RUN] Запись '{}' ({} байт)", key, value.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        info!("[DRY RUN] Удаление '{}'", key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        info!("[DRY RUN] Очистка хранилища");
        Ok(())
    }

    fn subscribe(&self) -> Result<StoreSubscription> {
        self.inner.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::shared_store::MemoryHub;

    #[test]
    fn test_writes_are_discarded() {
        let hub = MemoryHub::new();
        let real = hub.connect();
        real.set("windows", "[]").unwrap();

        let dry = DryRunSharedStore::new(Arc::new(hub.connect()));
        dry.set("windows", "[1]").unwrap();
        dry.clear().unwrap();

        assert_eq!(dry.get("windows").unwrap().as_deref(), Some("[]"));
        assert_eq!(real.get("windows").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_still_observes_others() {
        let hub = MemoryHub::new();
        let real = hub.connect();
        let dry = DryRunSharedStore::new(Arc::new(hub.connect()));
        let mut sub = dry.subscribe().unwrap();

        real.set("windows", "[]").unwrap();
        assert!(sub.try_recv().is_some());
    }
}
