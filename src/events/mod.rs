pub mod storage;
pub mod window;

pub use storage::StorageEvent;
pub use window::{WindowRecord, WindowSet, WindowShape};

/// События реестра окон для потребителя (рендера)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    /// Геометрия этого окна изменилась; `easing == false` означает мгновенную коррекцию
    ShapeChanged { easing: bool },
    /// Набор окон обновлён другим контекстом
    WindowsChanged,
}
