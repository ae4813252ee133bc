//! Build orchestration for Dockyard CI.
//!
//! An accepted event flows through:
//! trigger resolution, image cache, container creation, the pipeline
//! executor (clone + jobs, recorded through the build register), then
//! container removal and register finalization on every path.

pub mod container;
pub mod image_cache;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod register;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use container::Container;
pub use image_cache::{ImageCache, PreparedImage};
pub use orchestrator::BuildOrchestrator;
pub use pipeline::{PipelineExecutor, PipelineState};
pub use register::{Register, RegisterFactory, TaskHandle};
pub use trigger::{resolve_pipeline, resolve_trigger};
