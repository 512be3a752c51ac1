use crate::config::Config;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::RegistryEvent;
use crate::scene::SceneState;
use crate::services::window_registry::WindowRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::group::ShutdownSignal;
use super::r#trait::ContextRunnerTrait;

/// Один эмулируемый контекст: реестр окна + сцена.
///
/// Кадры и уведомления хранилища обрабатываются в одной задаче, поэтому
/// методы реестра никогда не выполняются одновременно, а только чередуются.
pub struct RealContextRunner {
    name: String,
    registry: WindowRegistry,
    scene: SceneState,
    events: mpsc::UnboundedReceiver<RegistryEvent>,
    frame_interval: Duration,
    status_interval: Duration,
    shutdown: ShutdownSignal,
    metadata: serde_json::Value,
}

impl RealContextRunner {
    pub fn new(
        config: Arc<Config>,
        index: usize,
        mut registry: WindowRegistry,
        shutdown: ShutdownSignal,
    ) -> Self {
        let name = format!("window-{}", index);
        info!("Инициализация контекста {}", name);

        // Обработчики реестра только ставят события в очередь; сцену
        // обновляет сам цикл после каждого обращения к реестру
        let (events_tx, events) = mpsc::unbounded_channel();
        let shape_tx = events_tx.clone();
        registry.set_win_shape_change_callback(move |easing| {
            let _ = shape_tx.send(RegistryEvent::ShapeChanged { easing });
        });
        registry.set_win_change_callback(move || {
            let _ = events_tx.send(RegistryEvent::WindowsChanged);
        });

        Self {
            metadata: serde_json::json!({ "name": name, "index": index }),
            name,
            registry,
            scene: SceneState::new(),
            events,
            frame_interval: Duration::from_millis(config.emulation.frame_interval_ms),
            status_interval: Duration::from_millis(config.emulation.status_interval_ms),
            shutdown,
        }
    }

    async fn run_impl(mut self) -> Result<()> {
        self.registry.init_with_metadata(Some(self.metadata.clone()))?;
        info!(
            "Контекст {} зарегистрирован как {}",
            self.name,
            self.registry.this_window_id().unwrap_or("?")
        );

        self.scene.on_windows_changed(&self.registry.windows());
        if let Some(this_window) = self.registry.this_window() {
            self.scene.on_shape_changed(&this_window.shape, false);
        }

        let started = Instant::now();
        let mut frames = interval(self.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut status = interval(self.status_interval);
        let mut notifications_open = true;

        loop {
            tokio::select! {
                _ = frames.tick() => {
                    self.frame(started.elapsed().as_secs_f64())?;
                }
                event = self.registry.next_storage_event(), if notifications_open => {
                    match event {
                        Some(event) => {
                            if self.registry.handle_storage_event(&event) {
                                self.apply_registry_events();
                            }
                        }
                        None => {
                            warn!("Контекст {}: канал уведомлений хранилища закрыт", self.name);
                            notifications_open = false;
                        }
                    }
                }
                _ = status.tick() => {
                    self.log_status();
                }
                _ = self.shutdown.stopped() => {
                    debug!("Контекст {} получил сигнал завершения", self.name);
                    break;
                }
            }
        }

        // Пока другие контексты снимают свои окна, этот ничего не публикует
        self.shutdown.cleanup_turn().await;
        self.registry.cleanup()?;
        info!("Контекст {} завершил работу", self.name);
        Ok(())
    }

    /// Один кадр: опрос геометрии, события реестра, шаг анимации сцены
    fn frame(&mut self, elapsed_secs: f64) -> Result<()> {
        self.registry.update()?;
        self.apply_registry_events();
        let windows = self.registry.windows();
        self.scene.step(&windows, elapsed_secs);
        Ok(())
    }

    fn apply_registry_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            debug_if_enabled!("Контекст {}: {:?}", self.name, event);
            let this_shape = self.registry.this_window().map(|w| w.shape);
            let windows = self.registry.windows();
            self.scene.apply(event, this_shape.as_ref(), &windows);

            if event == RegistryEvent::WindowsChanged {
                info!(
                    "Контекст {}: набор окон обновлён, окон: {}",
                    self.name,
                    windows.len()
                );
            }
        }
    }

    fn log_status(&self) {
        let shape = self
            .registry
            .this_window()
            .map(|w| w.shape.to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "[{}] окно {}, известно окон: {}, смещение сцены: {}",
            self.name,
            shape,
            self.registry.windows().len(),
            self.scene.offset()
        );

        for cube in self.scene.cubes() {
            debug_if_enabled!(
                "[{}] куб {} в {} (размер {}, цвет {:?})",
                self.name,
                cube.window_id,
                self.scene.viewport_position(cube),
                cube.size,
                cube.rgb()
            );
        }
    }
}

#[async_trait::async_trait]
impl ContextRunnerTrait for RealContextRunner {
    async fn run(self: Box<Self>) -> Result<()> {
        (*self).run_impl().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{StorageEvent, WindowSet, WindowShape};
    use crate::services::context_runner::shutdown_channel;
    use crate::services::geometry::SharedGeometry;
    use crate::services::session_store::MemorySessionStore;
    use crate::services::shared_store::{MemoryHub, SharedStore};
    use crate::services::window_registry::{StorageKeys, DEFAULT_WINDOWS_KEY};

    fn runner(hub: &MemoryHub, index: usize, geometry: SharedGeometry, shutdown: ShutdownSignal) -> RealContextRunner {
        let mut config = Config::default();
        config.emulation.frame_interval_ms = 5;
        let registry = WindowRegistry::new(
            Arc::new(hub.connect()),
            Arc::new(MemorySessionStore::new()),
            Box::new(geometry),
            StorageKeys::default(),
        )
        .unwrap();
        RealContextRunner::new(Arc::new(config), index, registry, shutdown)
    }

    fn shared_windows(hub: &MemoryHub) -> WindowSet {
        WindowSet::parse(hub.connect().get(DEFAULT_WINDOWS_KEY).unwrap().as_deref())
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("условие не выполнилось вовремя");
    }

    #[tokio::test]
    async fn runners_register_publish_moves_and_clean_up() {
        let hub = MemoryHub::new();
        let (stop_a, shutdown_a) = shutdown_channel();
        let (stop_b, shutdown_b) = shutdown_channel();
        let geometry_a = SharedGeometry::new(WindowShape::new(0, 0, 800, 600));
        let geometry_b = SharedGeometry::new(WindowShape::new(800, 0, 800, 600));

        let a = tokio::spawn(Box::new(runner(&hub, 0, geometry_a.clone(), shutdown_a)).run());
        let b = tokio::spawn(Box::new(runner(&hub, 1, geometry_b, shutdown_b)).run());

        wait_for(|| shared_windows(&hub).len() == 2).await;

        geometry_a.move_to(100, 0);
        wait_for(|| {
            shared_windows(&hub)
                .iter()
                .any(|w| w.shape == WindowShape::new(100, 0, 800, 600))
        })
        .await;

        stop_b.shutdown().await;
        b.await.unwrap().unwrap();
        assert_eq!(shared_windows(&hub).len(), 1);

        stop_a.shutdown().await;
        a.await.unwrap().unwrap();

        assert!(shared_windows(&hub).is_empty());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn own_window_gets_a_cube_after_lost_update() {
        let hub = MemoryHub::new();
        let (_stop, shutdown) = shutdown_channel();
        let geometry = SharedGeometry::new(WindowShape::new(0, 0, 800, 600));
        let mut runner = runner(&hub, 0, geometry.clone(), shutdown);
        runner.registry.init().unwrap();
        let own_id = runner.registry.this_window_id().unwrap().to_string();

        // Чужая публикация без нашей записи
        runner.registry.handle_storage_event(&StorageEvent::new(
            DEFAULT_WINDOWS_KEY,
            None,
            Some(r#"[{"id":"b1","shape":{"x":800,"y":0,"w":800,"h":600}}]"#.to_string()),
        ));
        runner.apply_registry_events();
        assert_eq!(runner.scene.cubes().len(), 1);

        geometry.move_to(10, 0);
        runner.frame(0.0).unwrap();

        assert_eq!(runner.registry.windows().len(), 2);
        let ids: Vec<&str> = runner.scene.cubes().iter().map(|c| c.window_id.as_str()).collect();
        assert_eq!(ids, vec!["b1", own_id.as_str()]);
        assert_eq!(runner.scene.offset(), crate::scene::Point::new(-10.0, 0.0));
    }
}
