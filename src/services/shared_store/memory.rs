use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::StorageEvent;
use dashmap::DashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::r#trait::{SharedStore, StoreSubscription};

/// Подписчик хаба: какому контексту принадлежит и куда доставлять события
struct Subscriber {
    id: u64,
    context: u64,
    sender: mpsc::UnboundedSender<StorageEvent>,
}

struct HubInner {
    data: DashMap<String, String>,
    // Обычно окон немного, поэтому держим подписчиков на стеке
    subscribers: Mutex<SmallVec<[Subscriber; 4]>>,
    next_context: AtomicU64,
    next_subscription: AtomicU64,
}

/// Общее хранилище в пределах процесса: эмулирует same-origin storage для
/// нескольких контекстов (окон), запущенных в одном процессе.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                data: DashMap::new(),
                subscribers: Mutex::new(SmallVec::new()),
                next_context: AtomicU64::new(1),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    /// Подключить новый контекст к хабу
    pub fn connect(&self) -> MemorySharedStore {
        let context = self.inner.next_context.fetch_add(1, Ordering::Relaxed);
        debug!("Контекст #{} подключён к общему хранилищу в памяти", context);
        MemorySharedStore {
            hub: self.clone(),
            context,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.inner.subscribers.lock().retain(|s| s.id != id);
        debug_if_enabled!("Подписка #{} на общее хранилище снята", id);
    }
}

/// Хендл одного контекста к [`MemoryHub`]
pub struct MemorySharedStore {
    hub: MemoryHub,
    context: u64,
}

impl MemorySharedStore {
    /// Изменение данных и рассылка уведомлений под одной блокировкой, чтобы
    /// порядок уведомлений совпадал с порядком записей
    fn mutate<F>(&self, mutation: F)
    where
        F: FnOnce(&DashMap<String, String>) -> SmallVec<[StorageEvent; 1]>,
    {
        let mut subscribers = self.hub.inner.subscribers.lock();
        let events = mutation(&self.hub.inner.data);

        for event in events {
            debug_if_enabled!("Контекст #{}: {}", self.context, event);
            subscribers.retain(|subscriber| {
                if subscriber.context == self.context {
                    return true;
                }
                // Закрытый получатель означает, что подписка уже не нужна
                subscriber.sender.send(event.clone()).is_ok()
            });
        }
    }
}

impl SharedStore for MemorySharedStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.hub.inner.data.get(key).map(|value| value.clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.mutate(|data| {
            let old_value = data.insert(key.to_string(), value.to_string());
            let mut events = SmallVec::new();
            events.push(StorageEvent::new(key, old_value, Some(value.to_string())));
            events
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.mutate(|data| {
            let mut events = SmallVec::new();
            if let Some((_, old_value)) = data.remove(key) {
                events.push(StorageEvent::new(key, Some(old_value), None));
            }
            events
        });
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.mutate(|data| {
            let keys: Vec<String> = data.iter().map(|entry| entry.key().clone()).collect();
            keys.into_iter()
                .filter_map(|key| data.remove(&key))
                .map(|(key, old_value)| StorageEvent::new(key, Some(old_value), None))
                .collect()
        });
        info!("Контекст #{} очистил общее хранилище", self.context);
        Ok(())
    }

    fn subscribe(&self) -> Result<StoreSubscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.hub.inner.next_subscription.fetch_add(1, Ordering::Relaxed);

        self.hub.inner.subscribers.lock().push(Subscriber {
            id,
            context: self.context,
            sender,
        });
        debug!("Контекст #{} подписался на изменения (подписка #{})", self.context, id);

        let hub = self.hub.clone();
        Ok(StoreSubscription::new(receiver, move || hub.unsubscribe(id)))
    }
}
