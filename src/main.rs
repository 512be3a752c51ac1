use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use multiwin_sync::config::Config;
use multiwin_sync::services::{create_context_runner, create_shared_store, ContextGroup, MemoryHub};

#[derive(Parser, Debug)]
#[command(name = "multiwin-sync")]
#[command(about = "Эмуляция нескольких окон, синхронизирующих свою геометрию через общее хранилище")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "multiwin.toml")]
    config: String,

    /// Режим сухого запуска (только наблюдение за хранилищем)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (по умолчанию - фильтр из конфигурации)
    #[arg(long)]
    log_level: Option<String>,

    /// Количество эмулируемых окон
    #[arg(short, long)]
    windows: Option<usize>,

    /// Очистить общее хранилище перед запуском
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let mut config = Config::load(&args.config)?;
    if let Some(windows) = args.windows {
        config.emulation.windows = windows;
    }
    config.storage.reset_on_start |= args.reset;
    config.validate()?;

    // Инициализация системы логирования: общий уровень + уточняющий фильтр
    let filter = args
        .log_level
        .clone()
        .unwrap_or_else(|| format!("{},{}", config.logging.level, config.logging.filter));
    init_tracing(&filter, &config.logging.format)?;

    info!("Запуск multiwin-sync v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - окна не регистрируются, записи отключены");
    }

    let config = Arc::new(config);
    let hub = MemoryHub::new();

    if config.storage.reset_on_start {
        let store = create_shared_store(&config, &hub, args.dry_run)?;
        store.clear()?;
        info!("Общее хранилище очищено перед запуском");
    }

    // Инициализация контекстов
    let contexts = if args.dry_run { 1 } else { config.emulation.windows };
    let mut group = ContextGroup::new();

    for index in 0..contexts {
        group.spawn(index, |shutdown| {
            create_context_runner(config.clone(), index, &hub, shutdown, args.dry_run)
        })?;
    }

    info!("Запущено контекстов: {}", group.len());

    // Ожидание сигнала завершения
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Получен сигнал завершения (Ctrl+C)");
        }
        Err(err) => {
            error!("Ошибка при ожидании сигнала завершения: {}", err);
        }
    }

    info!("Завершение работы...");

    // Контексты останавливаются все сразу, а окна снимают по очереди
    let shutdown_timeout = tokio::time::Duration::from_secs(5);
    let shutdown_result = tokio::time::timeout(shutdown_timeout, group.shutdown()).await;

    match shutdown_result {
        Ok(_) => info!("Все контексты завершили работу корректно"),
        Err(_) => warn!("Таймаут при завершении контекстов"),
    }

    info!("multiwin-sync завершил работу");
    Ok(())
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if format == "pretty" {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    }

    Ok(())
}
