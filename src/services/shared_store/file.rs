use crate::debug_if_enabled;
use crate::error::{Result, SyncError};
use crate::events::StorageEvent;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::r#trait::{SharedStore, StoreSubscription};

const VALUE_EXTENSION: &str = "json";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

struct FileStoreShared {
    directory: PathBuf,
    // Последнее известное этому хендлу значение каждого ключа; совпадение
    // с ним означает собственную запись или отсутствие изменений
    known: Mutex<HashMap<String, Option<String>>>,
    subscribers: Mutex<SmallVec<[(u64, mpsc::UnboundedSender<StorageEvent>); 2]>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    next_subscription: AtomicU64,
}

/// Общее хранилище в виде каталога: каждый ключ - файл `<key>.json`.
///
/// Изменения других процессов/контекстов отслеживаются через `notify`.
/// Собственные записи хендла не порождают уведомлений.
pub struct FileSharedStore {
    shared: Arc<FileStoreShared>,
}

impl FileSharedStore {
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        info!("Файловое общее хранилище: {}", directory.display());

        Ok(Self {
            shared: Arc::new(FileStoreShared {
                directory,
                known: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(SmallVec::new()),
                watcher: Mutex::new(None),
                next_subscription: AtomicU64::new(1),
            }),
        })
    }

    fn ensure_watcher(&self) -> Result<()> {
        let mut watcher_slot = self.shared.watcher.lock();
        if watcher_slot.is_some() {
            return Ok(());
        }

        let weak: Weak<FileStoreShared> = Arc::downgrade(&self.shared);
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                match result {
                    Ok(event) => {
                        if !matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                        ) {
                            return;
                        }
                        for key in event.paths.iter().filter_map(|p| key_from_path(p)) {
                            shared.observe(&key);
                        }
                    }
                    Err(e) => {
                        error!("Ошибка наблюдения за файловым хранилищем: {}", e);
                    }
                }
            },
            notify::Config::default(),
        )?;

        watcher.watch(&self.shared.directory, RecursiveMode::NonRecursive)?;
        debug!("Наблюдение за {} запущено", self.shared.directory.display());

        *watcher_slot = Some(watcher);
        Ok(())
    }
}

impl FileStoreShared {
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            return SyncError::storage_unavailable(format!(
                "Недопустимый ключ для файлового хранилища: '{}'",
                key
            ));
        }
        Ok(self.directory.join(format!("{}.{}", key, VALUE_EXTENSION)))
    }

    fn observe(&self, key: &str) {
        let path = match self.path_for(key) {
            Ok(path) => path,
            Err(_) => return,
        };
        let new_value = match read_value(&path) {
            Ok(value) => value,
            Err(e) => {
                warn!("Не удалось прочитать {}: {}", path.display(), e);
                return;
            }
        };

        let old_value = {
            let mut known = self.known.lock();
            if known.get(key) == Some(&new_value) {
                return;
            }
            known.insert(key.to_string(), new_value.clone()).flatten()
        };

        let event = StorageEvent::new(key, old_value, new_value);
        debug_if_enabled!("Файловое хранилище: {}", event);

        self.subscribers
            .lock()
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
    }

    fn unsubscribe(&self, id: u64) {
        let now_empty = {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|(subscription, _)| *subscription != id);
            subscribers.is_empty()
        };

        if now_empty {
            let watcher = self.watcher.lock().take();
            drop(watcher);
            debug!("Наблюдение за {} остановлено", self.directory.display());
        }
    }
}

impl SharedStore for FileSharedStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.shared.path_for(key)?;
        Ok(read_value(&path)?)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.shared.path_for(key)?;
        // Сначала запоминаем значение, чтобы событие наблюдателя о нашей же записи было отброшено
        self.shared
            .known
            .lock()
            .insert(key.to_string(), Some(value.to_string()));

        let tmp = self.shared.directory.join(format!(
            ".{}.{}.{}.tmp",
            key,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.shared.path_for(key)?;
        self.shared.known.lock().insert(key.to_string(), None);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<()> {
        let mut removed = 0usize;
        for entry in fs::read_dir(&self.shared.directory)? {
            let path = entry?.path();
            if let Some(key) = key_from_path(&path) {
                self.remove(&key)?;
                removed += 1;
            }
        }
        info!(
            "Файловое хранилище {} очищено ({} ключей)",
            self.shared.directory.display(),
            removed
        );
        Ok(())
    }

    fn subscribe(&self) -> Result<StoreSubscription> {
        self.ensure_watcher()?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.shared.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.shared.subscribers.lock().push((id, sender));

        let shared = Arc::clone(&self.shared);
        Ok(StoreSubscription::new(receiver, move || shared.unsubscribe(id)))
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn key_from_path(path: &Path) -> Option<String> {
    if path.extension()? != VALUE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    is_valid_key(stem).then(|| stem.to_string())
}

fn read_value(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
