use crate::error::Result;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::r#trait::ContextRunnerTrait;

/// Фаза жизненного цикла контекста, задаваемая группой
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    /// Прекратить кадры и публикации, подтвердить паузу
    Paused,
    /// Очередь этого контекста снять своё окно с регистрации
    Cleanup,
}

/// Сторона контекста: узнаёт о паузе и ждёт своей очереди на cleanup
pub struct ShutdownSignal {
    phase: watch::Receiver<ShutdownPhase>,
    paused: Option<oneshot::Sender<()>>,
}

impl ShutdownSignal {
    /// Завершается, когда группа просит контекст остановиться
    /// (или когда группа исчезла)
    pub async fn stopped(&mut self) {
        let _ = self
            .phase
            .wait_for(|phase| *phase != ShutdownPhase::Running)
            .await;
    }

    /// Подтвердить паузу и дождаться разрешения на cleanup
    pub async fn cleanup_turn(&mut self) {
        if let Some(paused) = self.paused.take() {
            let _ = paused.send(());
        }
        let _ = self
            .phase
            .wait_for(|phase| *phase == ShutdownPhase::Cleanup)
            .await;
    }
}

/// Сторона группы для одного контекста
struct ShutdownControl {
    phase: watch::Sender<ShutdownPhase>,
    paused: Option<oneshot::Receiver<()>>,
}

impl ShutdownControl {
    fn request_pause(&self) {
        let _ = self.phase.send(ShutdownPhase::Paused);
    }

    /// Ошибка означает, что задача контекста уже завершилась
    async fn wait_paused(&mut self) {
        if let Some(paused) = self.paused.take() {
            let _ = paused.await;
        }
    }

    fn release(&self) {
        let _ = self.phase.send(ShutdownPhase::Cleanup);
    }
}

/// Пара управления завершением для одного контекста
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (phase_tx, phase_rx) = watch::channel(ShutdownPhase::Running);
    let (paused_tx, paused_rx) = oneshot::channel();
    (
        ShutdownTrigger(ShutdownControl {
            phase: phase_tx,
            paused: Some(paused_rx),
        }),
        ShutdownSignal {
            phase: phase_rx,
            paused: Some(paused_tx),
        },
    )
}

/// Остановка одиночного контекста без группы
pub struct ShutdownTrigger(ShutdownControl);

impl ShutdownTrigger {
    /// Пауза и сразу разрешение на cleanup
    pub async fn shutdown(mut self) {
        self.0.request_pause();
        self.0.wait_paused().await;
        self.0.release();
    }
}

struct Member {
    index: usize,
    control: ShutdownControl,
    handle: JoinHandle<()>,
}

/// Все контексты одного процесса.
///
/// Завершение в две фазы: сначала все контексты останавливаются и перестают
/// публиковать, затем по одному снимают свои окна. Одновременный cleanup
/// нескольких контекстов мог бы вернуть в хранилище уже закрытые окна.
#[derive(Default)]
pub struct ContextGroup {
    members: Vec<Member>,
}

impl ContextGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Создать контекст через `create` и запустить его в отдельной задаче
    pub fn spawn<F>(&mut self, index: usize, create: F) -> Result<()>
    where
        F: FnOnce(ShutdownSignal) -> Result<Box<dyn ContextRunnerTrait + Send>>,
    {
        let (ShutdownTrigger(control), signal) = shutdown_channel();
        let runner = create(signal)?;

        let handle = tokio::spawn(async move {
            if let Err(e) = runner.run().await {
                error!("Ошибка в контексте #{}: {}", index, e);
            }
        });

        self.members.push(Member {
            index,
            control,
            handle,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Остановить все контексты и дождаться их cleanup по очереди
    pub async fn shutdown(self) {
        let mut members = self.members;

        for member in &members {
            member.control.request_pause();
        }
        for member in &mut members {
            member.control.wait_paused().await;
        }
        info!("Все контексты ({}) приостановлены", members.len());

        for member in members {
            member.control.release();
            if let Err(e) = member.handle.await {
                error!("Задача контекста #{} аварийно завершилась: {}", member.index, e);
            }
            debug!("Контекст #{} завершён", member.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::WindowSet;
    use crate::services::context_runner::create_context_runner;
    use crate::services::shared_store::{FileSharedStore, MemoryHub, SharedStore};
    use crate::services::window_registry::DEFAULT_WINDOWS_KEY;
    use std::sync::Arc;
    use std::time::Duration;

    fn busy_config(windows: usize) -> Config {
        let mut config = Config::default();
        config.emulation.windows = windows;
        config.emulation.frame_interval_ms = 1;
        config.emulation.frames_per_step = 1;
        config
    }

    fn stored_windows(store: &dyn SharedStore) -> WindowSet {
        WindowSet::parse(store.get(DEFAULT_WINDOWS_KEY).unwrap().as_deref())
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("условие не выполнилось вовремя");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shutdown_leaves_no_records_behind() {
        for _ in 0..25 {
            let hub = MemoryHub::new();
            let config = Arc::new(busy_config(3));
            let mut group = ContextGroup::new();
            for index in 0..3 {
                group
                    .spawn(index, |signal| {
                        create_context_runner(config.clone(), index, &hub, signal, false)
                    })
                    .unwrap();
            }
            assert_eq!(group.len(), 3);

            let observer = hub.connect();
            wait_for(|| stored_windows(&observer).len() == 3).await;
            // Окна двигаются каждый кадр, пока идёт остановка
            tokio::time::sleep(Duration::from_millis(10)).await;

            group.shutdown().await;

            assert!(stored_windows(&observer).is_empty());
            assert_eq!(hub.subscriber_count(), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shutdown_cleans_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = busy_config(3);
        config.storage.backend = "file".to_string();
        config.storage.directory = dir.path().to_path_buf();
        let config = Arc::new(config);

        let hub = MemoryHub::new();
        let mut group = ContextGroup::new();
        for index in 0..3 {
            group
                .spawn(index, |signal| {
                    create_context_runner(config.clone(), index, &hub, signal, false)
                })
                .unwrap();
        }

        let observer = FileSharedStore::open(dir.path()).unwrap();
        wait_for(|| stored_windows(&observer).len() == 3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        group.shutdown().await;

        assert!(stored_windows(&observer).is_empty());
    }

    #[tokio::test]
    async fn trigger_waits_for_pause_before_release() {
        let (trigger, mut signal) = shutdown_channel();
        let context = tokio::spawn(async move {
            signal.stopped().await;
            signal.cleanup_turn().await;
        });

        trigger.shutdown().await;
        tokio::time::timeout(Duration::from_secs(5), context)
            .await
            .expect("контекст не завершился")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_survives_failed_context() {
        let mut group = ContextGroup::new();
        let hub = MemoryHub::new();
        let mut config = Config::default();
        config.storage.backend = "indexeddb".to_string();

        let err = group.spawn(0, |signal| {
            create_context_runner(Arc::new(config.clone()), 0, &hub, signal, false)
        });
        assert!(err.is_err());
        assert!(group.is_empty());

        group.shutdown().await;
    }
}
