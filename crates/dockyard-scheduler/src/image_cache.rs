//! Build images keyed on the Dockerfile content SHA.

use dockyard_core::runtime::{image_name, tag_name, tagged_image_name};
use dockyard_core::{ContainerRuntime, Error, ImageSpec, Result, SourceControl};
use dockyard_executor::RuntimePool;
use std::path::{Component, Path};
use std::sync::Arc;
use tracing::info;

/// Image ready to run, and the endpoint it exists on.
pub struct PreparedImage {
    /// Containers must be created on this endpoint; other endpoints may not
    /// have the image.
    pub runtime: Arc<dyn ContainerRuntime>,
    /// `org/repo:tag`.
    pub image: String,
    /// First seven characters of the Dockerfile SHA.
    pub tag: String,
}

pub struct ImageCache {
    pool: Arc<RuntimePool>,
}

/// Split the Dockerfile path into the build context directory (relative to
/// the repository root) and the Dockerfile name inside it.
fn dockerfile_location(file: &str) -> Result<(&Path, &str)> {
    let path = Path::new(file);
    if path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(Error::InvalidSpec(format!(
            "docker.file must be a relative path inside the repository: {}",
            file
        )));
    }
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidSpec(format!("docker.file has no file name: {}", file)))?;
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    Ok((dir, name))
}

impl ImageCache {
    pub fn new(pool: Arc<RuntimePool>) -> Self {
        Self { pool }
    }

    /// Make sure `org/repo:<dockerfile sha>` exists on an endpoint from the
    /// pool, building it from the repository at `revision` when it does not.
    pub async fn ensure_image(
        &self,
        source_control: &dyn SourceControl,
        organization: &str,
        repository: &str,
        spec: &ImageSpec,
        revision: &str,
    ) -> Result<PreparedImage> {
        let (context, dockerfile) = dockerfile_location(&spec.file)?;
        let sha = source_control
            .get_file_sha(organization, repository, &spec.file, revision)
            .await?;
        info!(org = %organization, repo = %repository, dockerfile = %spec.file, sha = %sha, "Resolved Dockerfile");

        let runtime = self.pool.acquire();
        let image = tagged_image_name(organization, repository, &sha);
        let tag = tag_name(&sha).to_string();

        if runtime.image_exists(&image).await? {
            info!(image = %image, endpoint = %runtime.endpoint(), "Image already exists");
            return Ok(PreparedImage {
                runtime,
                image,
                tag,
            });
        }

        // Removed on drop, including when the download or build fails.
        let scratch = tempfile::Builder::new()
            .prefix("dockyard-")
            .tempdir()
            .map_err(|e| Error::Internal(format!("Failed to create scratch directory: {}", e)))?;

        source_control
            .download_archive(organization, repository, revision, scratch.path())
            .await?;

        let base = image_name(organization, repository);
        let context_dir = scratch.path().join(context);
        info!(image = %base, context = %context_dir.display(), "Building image");
        runtime
            .build_image(&base, &context_dir, dockerfile)
            .await?;
        runtime.tag_image(&base, &tag).await?;
        info!(image = %image, endpoint = %runtime.endpoint(), "Image built");

        Ok(PreparedImage {
            runtime,
            image,
            tag,
        })
    }
}
