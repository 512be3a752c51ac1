use crate::events::WindowShape;
use crate::services::window_registry::{StorageKeys, DEFAULT_SESSION_KEY, DEFAULT_WINDOWS_KEY};
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Верхняя граница числа эмулируемых окон
pub const MAX_WINDOWS: usize = 64;
/// Верхняя граница шага перемещения окна, пикселей
pub const MAX_STEP_PX: i32 = 10_000;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub emulation: EmulationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// "memory" - общий хаб в процессе, "file" - каталог с файлами
    pub backend: String,
    pub directory: PathBuf,
    pub windows_key: String,
    pub session_key: String,
    #[serde(default)]
    pub reset_on_start: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmulationConfig {
    pub windows: usize,
    pub frame_interval_ms: u64,
    pub frames_per_step: u32,
    pub step_px: i32,
    pub status_interval_ms: u64,
    pub base_shape: WindowShape,
}

impl StorageConfig {
    pub fn keys(&self) -> StorageKeys {
        StorageKeys {
            windows: self.windows_key.clone(),
            session: self.session_key.clone(),
        }
    }
}

impl EmulationConfig {
    /// Стартовая геометрия i-го эмулируемого окна: окна стоят в ряд
    pub fn shape_for(&self, index: usize) -> WindowShape {
        let index = i32::try_from(index).unwrap_or(i32::MAX);
        let offset = self.base_shape.w.saturating_add(self.step_px).saturating_mul(index);
        self.base_shape.translated(offset, 0)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "compact".to_string(),
                filter: "multiwin_sync=info".to_string(),
            },
            storage: StorageConfig {
                backend: "memory".to_string(),
                directory: PathBuf::from(".multiwin"),
                windows_key: DEFAULT_WINDOWS_KEY.to_string(),
                session_key: DEFAULT_SESSION_KEY.to_string(),
                reset_on_start: false,
            },
            emulation: EmulationConfig {
                windows: 2,
                frame_interval_ms: 16,
                frames_per_step: 120,
                step_px: 40,
                status_interval_ms: 2000,
                base_shape: WindowShape::new(0, 0, 800, 600),
            },
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("MULTIWIN_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        // Валидация хранилища
        match self.storage.backend.as_str() {
            "memory" | "file" => {}
            _ => anyhow::bail!("Неверный бэкенд хранилища: {}", self.storage.backend),
        }

        if self.storage.windows_key.is_empty() || self.storage.session_key.is_empty() {
            anyhow::bail!("Ключи хранилища не могут быть пустыми");
        }

        if self.storage.windows_key == self.storage.session_key {
            anyhow::bail!("windows_key и session_key должны различаться");
        }

        // Валидация эмуляции
        if self.emulation.windows == 0 || self.emulation.windows > MAX_WINDOWS {
            anyhow::bail!(
                "windows должно быть от 1 до {}, получено {}",
                MAX_WINDOWS,
                self.emulation.windows
            );
        }

        if self.emulation.step_px.unsigned_abs() > MAX_STEP_PX as u32 {
            anyhow::bail!("step_px должно быть не больше {} по модулю", MAX_STEP_PX);
        }

        if self.emulation.frame_interval_ms == 0 {
            anyhow::bail!("frame_interval_ms должно быть больше 0");
        }

        if self.emulation.status_interval_ms < 100 {
            anyhow::bail!("status_interval_ms должно быть минимум 100");
        }

        if self.emulation.frames_per_step == 0 {
            anyhow::bail!("frames_per_step должно быть больше 0");
        }

        let shape = &self.emulation.base_shape;
        if shape.w <= 0 || shape.h <= 0 {
            anyhow::bail!("Размер окна должен быть положительным: {}", shape);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.storage.backend = "indexeddb".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.session_key = config.storage.windows_key.clone();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.emulation.base_shape.w = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_emulation_bounds_rejected() {
        let mut config = Config::default();
        config.emulation.windows = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.emulation.windows = MAX_WINDOWS + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.emulation.step_px = -(MAX_STEP_PX + 1);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.emulation.windows = MAX_WINDOWS;
        config.emulation.step_px = -MAX_STEP_PX;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shape_for_saturates_instead_of_overflowing() {
        let mut config = Config::default();
        config.emulation.base_shape = WindowShape::new(i32::MAX - 10, 0, i32::MAX, 600);
        config.emulation.step_px = MAX_STEP_PX;

        let shape = config.emulation.shape_for(usize::MAX);
        assert_eq!(shape.x, i32::MAX);
        assert_eq!(shape.w, i32::MAX);
    }

    #[test]
    fn test_load_merges_file_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
backend = "file"
directory = "/tmp/multiwin-test"

[emulation]
windows = 3
base_shape = {{ x = -100, y = 0, w = 640, h = 480 }}
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.storage.backend, "file");
        assert_eq!(config.storage.windows_key, "windows");
        assert_eq!(config.emulation.windows, 3);
        assert_eq!(config.emulation.base_shape, WindowShape::new(-100, 0, 640, 480));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load("/nonexistent/multiwin.toml").unwrap();
        assert_eq!(config.storage.backend, "memory");
    }

    #[test]
    fn test_keys_and_shapes() {
        let config = Config::default();
        assert_eq!(config.storage.keys(), StorageKeys::default());
        assert_eq!(config.emulation.shape_for(0), WindowShape::new(0, 0, 800, 600));
        assert_eq!(config.emulation.shape_for(2), WindowShape::new(1680, 0, 800, 600));
    }
}
