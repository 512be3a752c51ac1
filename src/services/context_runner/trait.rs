use crate::config::Config;
use crate::error::Result;
use crate::services::geometry::ScriptedGeometry;
use crate::services::session_store::MemorySessionStore;
use crate::services::shared_store::{create_shared_store, MemoryHub};
use crate::services::window_registry::WindowRegistry;
use std::sync::Arc;

use super::group::ShutdownSignal;

/// Trait for context runners that can run in different modes
#[async_trait::async_trait]
pub trait ContextRunnerTrait {
    /// Run the context until the group stops it, then wait for its cleanup turn
    async fn run(self: Box<Self>) -> Result<()>;
}

/// Factory function to create an emulated context based on the dry_run flag.
///
/// A real runner registers a window that moves along a scripted path; a
/// dry-run runner only observes the shared store and never writes to it.
pub fn create_context_runner(
    config: Arc<Config>,
    index: usize,
    hub: &MemoryHub,
    shutdown: ShutdownSignal,
    dry_run: bool,
) -> Result<Box<dyn ContextRunnerTrait + Send>> {
    let store = create_shared_store(&config, hub, dry_run)?;

    if dry_run {
        Ok(Box::new(super::dry_run::DryRunContextRunner::new(
            config, store, shutdown,
        )))
    } else {
        // Разный темп у окон, чтобы они не двигались синхронно
        let frames_per_step = config.emulation.frames_per_step + index as u32 * 17;
        let geometry = ScriptedGeometry::orbit(
            config.emulation.shape_for(index),
            config.emulation.step_px,
            frames_per_step,
        );
        let registry = WindowRegistry::new(
            store,
            Arc::new(MemorySessionStore::new()),
            Box::new(geometry),
            config.storage.keys(),
        )?;

        Ok(Box::new(super::runner::RealContextRunner::new(
            config, index, registry, shutdown,
        )))
    }
}
