//! Source-control collaborator.
//!
//! The orchestrator only relies on the operations below; transport and
//! not-found failures surface as [`crate::Error::SourceControl`] or [`crate::Error::NotFound`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::Result;

/// State of a commit status entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
    Error,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
            CommitState::Error => "error",
        }
    }
}

/// A commit status entry posted on a SHA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub context: String,
    pub description: String,
    pub state: CommitState,
}

/// A repository the authenticated user can access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub clone_url: String,
    pub private: bool,
    pub default_branch: String,
}

/// Operations the orchestrator consumes from the source-control host.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Raw content of `path` as it exists at `revision`.
    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        revision: &str,
    ) -> Result<Vec<u8>>;

    /// Content hash of `path` as it exists at `revision`.
    async fn get_file_sha(&self, owner: &str, repo: &str, path: &str, revision: &str)
    -> Result<String>;

    /// Download the full repository at `revision` and unpack it into `dest`.
    async fn download_archive(
        &self,
        owner: &str,
        repo: &str,
        revision: &str,
        dest: &Path,
    ) -> Result<()>;

    async fn create_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        status: &CommitStatus,
    ) -> Result<()>;

    /// Register the event webhook, returning the provider's hook id.
    async fn create_hook(&self, owner: &str, repo: &str) -> Result<i64>;

    async fn delete_hook(&self, owner: &str, repo: &str, hook_id: i64) -> Result<()>;

    async fn list_repositories(&self) -> Result<Vec<RepositorySummary>>;
}

/// Builds a client authenticated with a repository's access token.
pub trait SourceControlFactory: Send + Sync {
    fn client(&self, access_token: &str) -> Arc<dyn SourceControl>;
}
