use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка сериализации: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Ошибка наблюдения за файлами: {0}")]
    Watch(#[from] notify::Error),

    #[error("Общее хранилище недоступно: {0}")]
    StorageUnavailable(String),

    #[error("Сессионное хранилище недоступно: {0}")]
    SessionUnavailable(String),

    #[error("Реестр окон уже завершил работу")]
    RegistryClosed,

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn storage_unavailable<T>(msg: impl Into<String>) -> Result<T> {
        Err(SyncError::StorageUnavailable(msg.into()))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! sync_error {
    (storage_unavailable, $($arg:tt)*) => {
        $crate::error::SyncError::StorageUnavailable(format!($($arg)*))
    };
    (session_unavailable, $($arg:tt)*) => {
        $crate::error::SyncError::SessionUnavailable(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::SyncError::Internal(format!($($arg)*))
    };
}
