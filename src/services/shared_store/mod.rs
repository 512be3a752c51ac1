//! SharedStore service: responsibility and boundaries
//!
//! This module and its submodules are responsible ONLY for moving raw string
//! values between contexts and delivering change notifications to the
//! *other* contexts. They know nothing about windows or their geometry;
//! parsing and merging of the window set belong to WindowRegistry.

mod dry_run;
mod file;
mod memory;
mod r#trait;

pub use self::dry_run::DryRunSharedStore;
pub use self::file::FileSharedStore;
pub use self::memory::{MemoryHub, MemorySharedStore};
pub use self::r#trait::{create_shared_store, SharedStore, StoreSubscription};
