//! ContextRunner service: responsibility and boundaries
//!
//! A runner drives exactly one context: it feeds frame ticks and storage
//! notifications into that context's WindowRegistry on a single task and
//! forwards the registry callbacks to the scene. It MUST NOT touch the
//! shared store directly; every write goes through the registry.
//!
//! Contexts of one process are owned by a ContextGroup, which stops them in
//! two phases: pause everyone, then let each one clean up in turn.

mod dry_run;
mod group;
mod runner;
mod r#trait;

pub use self::dry_run::DryRunContextRunner;
pub use self::group::{shutdown_channel, ContextGroup, ShutdownPhase, ShutdownSignal, ShutdownTrigger};
pub use self::r#trait::{create_context_runner, ContextRunnerTrait};
pub use self::runner::RealContextRunner;
