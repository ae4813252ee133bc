//! Error types for Dockyard.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no trigger matching the event '{event}' and branch '{branch}'")]
    NoMatchingTrigger { event: String, branch: String },

    #[error("no pipeline matching the trigger pipeline: {0}")]
    NoMatchingPipeline(String),

    #[error("job '{0}' is not defined in the build spec")]
    UnknownJob(String),

    #[error("command exited with code {code}")]
    CommandFailed { code: i64 },

    #[error("clone failed: {0}")]
    CloneFailed(#[source] Box<Error>),

    #[error("job '{job}' failed: {source}")]
    JobFailed {
        job: String,
        #[source]
        source: Box<Error>,
    },

    #[error("source control error: {0}")]
    SourceControl(String),

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("invalid build spec: {0}")]
    InvalidSpec(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Spec misconfiguration detected before any build record exists.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Error::NoMatchingTrigger { .. } | Error::NoMatchingPipeline(_) | Error::InvalidSpec(_)
        )
    }

    /// A clone or job command ran inside the container and failed.
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            Error::CommandFailed { .. } | Error::CloneFailed(_) | Error::JobFailed { .. }
        )
    }

    /// Exit code of the failing command, looking through clone/job wrappers.
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            Error::CommandFailed { code } => Some(*code),
            Error::CloneFailed(inner) => inner.exit_code(),
            Error::JobFailed { source, .. } => source.exit_code(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
