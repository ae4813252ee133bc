//! GitHub API errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Invalid payload: {0}")]
    Payload(String),
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        GitHubError::Request(err.to_string())
    }
}

impl From<GitHubError> for dockyard_core::Error {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::NotFound(msg) => dockyard_core::Error::NotFound(msg),
            other => dockyard_core::Error::SourceControl(other.to_string()),
        }
    }
}
