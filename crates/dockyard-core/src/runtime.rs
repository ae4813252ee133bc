//! Container-runtime collaborator and image naming.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

use crate::Result;

/// Settings for the single disposable container of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Tagged image, see [`tagged_image_name`].
    pub image: String,
    pub user: Option<String>,
    pub working_dir: Option<String>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    /// Memory ceiling in bytes.
    pub memory_limit: i64,
}

/// Destination for live command output.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write(&self, chunk: Bytes) -> Result<()>;
}

/// One container-runtime endpoint (e.g. one Docker host of a cluster).
///
/// Every call blocks the calling build until the runtime answers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Address of this endpoint, for logging.
    fn endpoint(&self) -> &str;

    async fn image_exists(&self, tagged_image: &str) -> Result<bool>;

    /// Build `context_dir` into `image_name` (implicitly `:latest`).
    async fn build_image(&self, image_name: &str, context_dir: &Path, dockerfile: &str)
    -> Result<()>;

    async fn tag_image(&self, image_name: &str, tag: &str) -> Result<()>;

    /// Create a container and return its id.
    async fn create_container(&self, config: &ContainerConfig) -> Result<String>;

    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Run `cmd` in a running container, streaming combined stdout/stderr to
    /// `sink` as it is produced. Returns the exit code; a non-zero code is not
    /// an error at this level.
    async fn exec(&self, container_id: &str, cmd: Vec<String>, sink: &dyn OutputSink)
    -> Result<i64>;

    /// Forced removal, even while running.
    async fn remove_container(&self, container_id: &str) -> Result<()>;
}

/// `{organization}/{repository}` in lower case.
pub fn image_name(organization: &str, repository: &str) -> String {
    format!(
        "{}/{}",
        organization.to_lowercase(),
        repository.to_lowercase()
    )
}

/// First seven characters of the Dockerfile content SHA.
pub fn tag_name(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

/// Image tag keyed on the Dockerfile content SHA, not the commit SHA, so the
/// image is only rebuilt when the Dockerfile changes.
pub fn tagged_image_name(organization: &str, repository: &str, sha: &str) -> String {
    format!("{}:{}", image_name(organization, repository), tag_name(sha))
}
