pub mod context_runner;
pub mod geometry;
pub mod session_store;
pub mod shared_store;
pub mod window_registry;

pub use context_runner::{create_context_runner, ContextGroup, ShutdownSignal};
pub use geometry::{GeometrySource, ScriptedGeometry, SharedGeometry};
pub use session_store::{MemorySessionStore, SessionStore};
pub use shared_store::{create_shared_store, MemoryHub, SharedStore, StoreSubscription};
pub use window_registry::{StorageKeys, WindowRegistry};
