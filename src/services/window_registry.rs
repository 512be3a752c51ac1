use crate::{debug_if_enabled, sync_error, trace_if_enabled};
use crate::error::{Result, SyncError};
use crate::events::{StorageEvent, WindowRecord, WindowSet};
use crate::services::geometry::GeometrySource;
use crate::services::session_store::SessionStore;
use crate::services::shared_store::{SharedStore, StoreSubscription};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ключ общего хранилища со списком окон
pub const DEFAULT_WINDOWS_KEY: &str = "windows";
/// Ключ сессионного хранилища с идентификатором контекста
pub const DEFAULT_SESSION_KEY: &str = "windowId";

/// Имена ключей, под которыми реестр хранит своё состояние
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub windows: String,
    pub session: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            windows: DEFAULT_WINDOWS_KEY.to_string(),
            session: DEFAULT_SESSION_KEY.to_string(),
        }
    }
}

type ShapeChangeCallback = Box<dyn FnMut(bool) + Send>;
type WindowsChangeCallback = Box<dyn FnMut() + Send>;

/// Реестр окон одного контекста.
///
/// Хранит снимок всех известных окон, публикует его целиком в общее
/// хранилище при каждом изменении собственной записи и заменяет его целиком
/// при уведомлении от другого контекста. Каждый контекст изменяет только
/// свою запись; гонки между контекстами разрешаются по принципу
/// "последняя запись побеждает".
pub struct WindowRegistry {
    store: Arc<dyn SharedStore>,
    session: Arc<dyn SessionStore>,
    geometry: Box<dyn GeometrySource>,
    keys: StorageKeys,
    // Состояние компонента
    windows: WindowSet,
    this_id: Option<String>,
    this_window: Option<WindowRecord>,
    subscription: Option<StoreSubscription>,
    on_shape_change: Option<ShapeChangeCallback>,
    on_windows_change: Option<WindowsChangeCallback>,
    cleaned_up: bool,
}

impl WindowRegistry {
    /// Подписывается на уведомления и читает текущий набор окон из общего
    /// хранилища. Отсутствующее или битое значение даёт пустой набор.
    pub fn new(
        store: Arc<dyn SharedStore>,
        session: Arc<dyn SessionStore>,
        geometry: Box<dyn GeometrySource>,
        keys: StorageKeys,
    ) -> Result<Self> {
        // Подписка до чтения, чтобы не потерять запись между ними
        let subscription = store.subscribe()?;
        let windows = WindowSet::parse(store.get(&keys.windows)?.as_deref());
        debug!("Из общего хранилища прочитано окон: {}", windows.len());

        Ok(Self {
            store,
            session,
            geometry,
            keys,
            windows,
            this_id: None,
            this_window: None,
            subscription: Some(subscription),
            on_shape_change: None,
            on_windows_change: None,
            cleaned_up: false,
        })
    }

    /// Регистрация текущего контекста
    pub fn init(&mut self) -> Result<()> {
        self.init_with_metadata(None)
    }

    /// Регистрация текущего контекста с произвольными метаданными в записи.
    /// Повторный вызов ничего не делает.
    pub fn init_with_metadata(&mut self, metadata: Option<serde_json::Value>) -> Result<()> {
        if self.this_window.is_some() {
            debug!("Реестр уже инициализирован, повторный init пропущен");
            return Ok(());
        }
        if self.cleaned_up {
            return Err(SyncError::RegistryClosed);
        }

        let id = self.acquire_identity()?;
        let shape = self.geometry.current_shape();

        let mut record = WindowRecord::new(id.clone(), shape);
        if let Some(metadata) = metadata {
            record = record.with_metadata(metadata);
        }

        // Запись с тем же id могла остаться от перезагрузки страницы
        self.windows.upsert(record.clone());
        self.this_id = Some(id);
        self.this_window = Some(record.clone());

        info!("Окно зарегистрировано: {} (всего окон: {})", record, self.windows.len());
        self.publish()
    }

    fn acquire_identity(&self) -> Result<String> {
        let existing = self
            .session
            .get(&self.keys.session)
            .map_err(|e| sync_error!(session_unavailable, "{}", e))?;

        match existing {
            Some(id) if !id.is_empty() => {
                debug!("Используем идентификатор сессии: {}", id);
                Ok(id)
            }
            _ => {
                let id = Uuid::new_v4().to_string();
                self.session
                    .set(&self.keys.session, &id)
                    .map_err(|e| sync_error!(session_unavailable, "{}", e))?;
                debug!("Сгенерирован новый идентификатор: {}", id);
                Ok(id)
            }
        }
    }

    /// Единственный путь записи: весь набор целиком, без compare-and-swap
    fn publish(&self) -> Result<()> {
        let json = self.windows.to_json()?;
        self.store.set(&self.keys.windows, &json)?;
        debug_if_enabled!("Опубликовано окон: {}", self.windows.len());
        Ok(())
    }

    /// Вызывать раз в кадр. Пишет в хранилище только если геометрия изменилась.
    pub fn update(&mut self) -> Result<()> {
        let Some(this_window) = self.this_window.as_mut() else {
            return Ok(());
        };

        let shape = self.geometry.current_shape();
        if shape == this_window.shape {
            return Ok(());
        }

        debug_if_enabled!("Геометрия окна {}: {} -> {}", this_window.id, this_window.shape, shape);
        this_window.shape = shape;
        let record = this_window.clone();

        if !self.windows.set_shape(&record.id, shape) {
            // Нашу запись затёрла чужая публикация - восстанавливаем
            debug!("Запись {} отсутствует в наборе, добавляем заново", record.id);
            self.windows.upsert(record);
        }

        if let Some(callback) = self.on_shape_change.as_mut() {
            callback(false);
        }

        self.publish()
    }

    /// Обработка уведомления общего хранилища. Возвращает `true`, если
    /// уведомление относилось к списку окон.
    pub fn handle_storage_event(&mut self, event: &StorageEvent) -> bool {
        if !event.is_for(&self.keys.windows) {
            trace_if_enabled!("Игнорируем изменение ключа '{}'", event.key);
            return false;
        }

        // Полная замена, а не слияние
        self.windows = WindowSet::parse(event.new_value.as_deref());
        debug_if_enabled!("Набор окон обновлён другим контекстом: {}", self.windows.len());

        // Устаревшая копия своей записи будет исправлена следующим update()
        if let (Some(this_window), Some(id)) = (self.this_window.as_mut(), self.this_id.as_deref()) {
            if let Some(record) = self.windows.get(id) {
                *this_window = record.clone();
            }
        }

        if let Some(callback) = self.on_windows_change.as_mut() {
            callback();
        }
        true
    }

    /// Обработать все уже поступившие уведомления, не дожидаясь новых
    pub fn drain_storage_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.subscription.as_mut().and_then(|s| s.try_recv()) {
            self.handle_storage_event(&event);
            handled += 1;
        }
        handled
    }

    /// Дождаться следующего уведомления. После `cleanup` никогда не завершается;
    /// `None` означает, что бэкенд закрыл канал.
    pub async fn next_storage_event(&mut self) -> Option<StorageEvent> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Удалить свою запись из свежего снимка хранилища, опубликовать набор
    /// и отписаться. Идемпотентно.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
        self.cleaned_up = true;
        self.subscription = None;

        if let Some(this_window) = self.this_window.take() {
            // Уведомления о последних чужих записях могли ещё не дойти
            match self.store.get(&self.keys.windows) {
                Ok(raw) => self.windows = WindowSet::parse(raw.as_deref()),
                Err(e) => warn!("Не удалось перечитать набор окон перед снятием с регистрации: {}", e),
            }
            self.windows.remove(&this_window.id);
            info!("Окно {} снято с регистрации", this_window.id);
            self.publish()?;
        }
        Ok(())
    }

    /// Копия текущего набора окон
    pub fn windows(&self) -> Vec<WindowRecord> {
        self.windows.to_vec()
    }

    pub fn window_set(&self) -> &WindowSet {
        &self.windows
    }

    pub fn this_window(&self) -> Option<WindowRecord> {
        self.this_window.clone()
    }

    pub fn this_window_id(&self) -> Option<&str> {
        self.this_id.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.this_window.is_some()
    }

    /// Заменяет ранее установленный обработчик
    pub fn set_win_shape_change_callback<F>(&mut self, callback: F)
    where
        F: FnMut(bool) + Send + 'static,
    {
        self.on_shape_change = Some(Box::new(callback));
    }

    /// Заменяет ранее установленный обработчик
    pub fn set_win_change_callback<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.on_windows_change = Some(Box::new(callback));
    }
}

impl Drop for WindowRegistry {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("Не удалось снять окно с регистрации при завершении: {}", e);
        }
    }
}
