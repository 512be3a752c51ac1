use crate::config::Config;
use crate::error::Result;
use crate::events::WindowSet;
use crate::services::shared_store::SharedStore;
use crate::services::window_registry::StorageKeys;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use super::group::ShutdownSignal;
use super::r#trait::ContextRunnerTrait;

/// Наблюдатель: читает общее хранилище и логирует набор окон, но не
/// регистрирует собственное окно и ничего не пишет
pub struct DryRunContextRunner {
    store: Arc<dyn SharedStore>,
    keys: StorageKeys,
    status_interval: Duration,
    shutdown: ShutdownSignal,
    observed: Arc<AtomicUsize>,
}

impl DryRunContextRunner {
    pub fn new(config: Arc<Config>, store: Arc<dyn SharedStore>, shutdown: ShutdownSignal) -> Self {
        info!("Инициализация DryRunContextRunner");
        Self {
            store,
            keys: config.storage.keys(),
            status_interval: Duration::from_millis(config.emulation.status_interval_ms),
            shutdown,
            observed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Счётчик замеченных изменений списка окон
    pub fn observed_changes(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.observed)
    }

    async fn run_impl(mut self) -> Result<()> {
        info!("Dry-run режим - наблюдаем за общим хранилищем без регистрации окна");

        let mut subscription = self.store.subscribe()?;
        let mut windows = WindowSet::parse(self.store.get(&self.keys.windows)?.as_deref());
        log_windows("начальное состояние", &windows);

        let mut status = interval(self.status_interval);

        loop {
            tokio::select! {
                event = subscription.recv() => {
                    match event {
                        Some(event) if event.is_for(&self.keys.windows) => {
                            windows = WindowSet::parse(event.new_value.as_deref());
                            self.observed.fetch_add(1, Ordering::Relaxed);
                            log_windows("изменение", &windows);
                        }
                        Some(event) => {
                            debug!("Dry-run: изменён посторонний ключ '{}'", event.key);
                        }
                        None => {
                            warn!("Dry-run: канал уведомлений хранилища закрыт");
                            break;
                        }
                    }
                }
                _ = status.tick() => {
                    debug!(
                        "Dry-run: известно окон: {}, изменений: {}",
                        windows.len(),
                        self.observed.load(Ordering::Relaxed)
                    );
                }
                _ = self.shutdown.stopped() => break,
            }
        }

        // Наблюдателю нечего снимать с регистрации
        self.shutdown.cleanup_turn().await;

        info!("Dry-run наблюдатель завершил работу");
        Ok(())
    }
}

fn log_windows(reason: &str, windows: &WindowSet) {
    info!("Dry-run: {} - окон: {}", reason, windows.len());
    for record in windows {
        info!("Dry-run:   {}", record);
    }
}

#[async_trait::async_trait]
impl ContextRunnerTrait for DryRunContextRunner {
    async fn run(self: Box<Self>) -> Result<()> {
        (*self).run_impl().await
    }
}
