//! Синхронизация набора окон между независимыми контекстами.
//!
//! Каждый контекст регистрирует своё окно в общем key-value хранилище,
//! раз в кадр публикует изменения своей геометрии и получает уведомления
//! о записях других контекстов. Координатора нет, конфликты разрешаются
//! по принципу "последняя запись побеждает".

mod utils;

pub mod config;
pub mod error;
pub mod events;
pub mod scene;
pub mod services;

pub use error::{Result, SyncError};
pub use events::{RegistryEvent, StorageEvent, WindowRecord, WindowSet, WindowShape};
pub use services::{
    GeometrySource, MemoryHub, MemorySessionStore, SessionStore, SharedGeometry, SharedStore,
    StorageKeys, WindowRegistry,
};
