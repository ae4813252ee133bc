//! Core domain types and traits for the Dockyard CI orchestrator.
//!
//! This crate contains:
//! - Build identifiers and the persisted build/task records
//! - Normalized source-control events
//! - The build specification committed in target repositories
//! - Collaborator traits for source control and container runtimes

pub mod build;
pub mod error;
pub mod event;
pub mod id;
pub mod runtime;
pub mod source;
pub mod spec;

pub use build::{Build, BuildStatus, Task};
pub use error::{Error, Result};
pub use event::{Event, EventType, PullRequest};
pub use id::BuildId;
pub use runtime::{ContainerConfig, ContainerRuntime, OutputSink};
pub use source::{CommitState, CommitStatus, RepositorySummary, SourceControl, SourceControlFactory};
pub use spec::{BuildSpec, ImageSpec, PipelineSpec, TriggerSpec};
