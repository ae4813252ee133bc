//! GitHub REST client used as a build's source control.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dockyard_config::GitHubConfig;
use dockyard_core::source::RepositorySummary;
use dockyard_core::{CommitStatus, SourceControl, SourceControlFactory};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::GitHubError;
use crate::archive::extract_tarball;

const USER_AGENT: &str = "Dockyard-CI";
const ACCEPT: &str = "application/vnd.github+json";
const PAGE_SIZE: usize = 100;
/// GitHub rejects longer status descriptions.
const MAX_DESCRIPTION: usize = 140;

/// Result of the contents API for a single file.
#[derive(Debug, Deserialize)]
struct FileContent {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

impl FileContent {
    fn decode(&self) -> Result<Vec<u8>, GitHubError> {
        if self.encoding != "base64" {
            return Err(GitHubError::Parse(format!(
                "unsupported content encoding '{}'",
                self.encoding
            )));
        }
        let compact: String = self
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        STANDARD
            .decode(compact)
            .map_err(|e| GitHubError::Parse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    name: String,
    full_name: String,
    owner: RepoOwner,
    private: bool,
    clone_url: String,
    #[serde(default)]
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct RepoOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct HookResponse {
    id: i64,
}

/// Hook registration settings shared by all clients.
#[derive(Debug, Clone, Default)]
struct HookSettings {
    events: Vec<String>,
    events_url: Option<String>,
    secret: Option<String>,
}

/// Truncate to GitHub's status description limit, on a char boundary.
fn truncate_description(description: &str) -> String {
    description.chars().take(MAX_DESCRIPTION).collect()
}

fn encode_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// GitHub API client authenticated with one access token.
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    access_token: String,
    hooks: HookSettings,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            hooks: HookSettings::default(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::GET, url)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", ACCEPT)
    }

    /// Turn a non-success response into an error, keeping 404s distinguishable.
    async fn check(
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, GitHubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GitHubError::NotFound(what.to_string()));
        }
        Err(GitHubError::Api(format!(
            "Failed to get {} ({}): {}",
            what, status, text
        )))
    }

    async fn file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        revision: &str,
    ) -> Result<FileContent, GitHubError> {
        let url = self.url(&format!(
            "/repos/{}/{}/contents/{}?ref={}",
            owner,
            repo,
            encode_path(path),
            urlencoding::encode(revision)
        ));
        debug!(owner = %owner, repo = %repo, path = %path, revision = %revision, "Fetching file");

        let response = self.get(&url).send().await?;
        let response = Self::check(
            response,
            &format!("{} in {}/{} at {}", path, owner, repo, revision),
        )
        .await?;
        response
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))
    }

    async fn list_repos_page(&self, page: usize) -> Result<Vec<GitHubRepo>, GitHubError> {
        let url = self.url(&format!(
            "/user/repos?sort=updated&direction=desc&page={}&per_page={}&type=all",
            page, PAGE_SIZE
        ));
        let response = self.get(&url).send().await?;
        let response = Self::check(response, "repositories").await?;
        response
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        revision: &str,
    ) -> dockyard_core::Result<Vec<u8>> {
        let file = self.file(owner, repo, path, revision).await?;
        Ok(file.decode()?)
    }

    async fn get_file_sha(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        revision: &str,
    ) -> dockyard_core::Result<String> {
        let file = self.file(owner, repo, path, revision).await?;
        Ok(file.sha)
    }

    async fn download_archive(
        &self,
        owner: &str,
        repo: &str,
        revision: &str,
        dest: &Path,
    ) -> dockyard_core::Result<()> {
        let url = self.url(&format!("/repos/{}/{}/tarball/{}", owner, repo, revision));
        info!(owner = %owner, repo = %repo, revision = %revision, "Downloading repository archive");

        let response = self
            .get(&url)
            .send()
            .await
            .map_err(GitHubError::from)?;
        let response =
            Self::check(response, &format!("archive of {}/{} at {}", owner, repo, revision))
                .await?;
        let data = response.bytes().await.map_err(GitHubError::from)?;

        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || extract_tarball(&data, &dest))
            .await
            .map_err(|e| dockyard_core::Error::Internal(format!("Extraction task failed: {}", e)))??;
        Ok(())
    }

    async fn create_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        status: &CommitStatus,
    ) -> dockyard_core::Result<()> {
        let url = self.url(&format!("/repos/{}/{}/statuses/{}", owner, repo, sha));
        let payload = serde_json::json!({
            "state": status.state.as_str(),
            "description": truncate_description(&status.description),
            "context": status.context,
        });

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&payload)
            .send()
            .await
            .map_err(GitHubError::from)?;
        Self::check(response, &format!("status of {}/{}@{}", owner, repo, sha)).await?;
        Ok(())
    }

    async fn create_hook(&self, owner: &str, repo: &str) -> dockyard_core::Result<i64> {
        let events_url = self.hooks.events_url.as_deref().ok_or_else(|| {
            GitHubError::Api("no events url configured for webhooks".to_string())
        })?;

        let mut config = serde_json::json!({
            "url": events_url,
            "content_type": "json",
            "insecure_ssl": "0",
        });
        if let Some(secret) = &self.hooks.secret {
            config["secret"] = serde_json::Value::String(secret.clone());
        }
        let payload = serde_json::json!({
            "name": "web",
            "active": true,
            "events": self.hooks.events,
            "config": config,
        });

        let url = self.url(&format!("/repos/{}/{}/hooks", owner, repo));
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&payload)
            .send()
            .await
            .map_err(GitHubError::from)?;
        let response = Self::check(response, &format!("hooks of {}/{}", owner, repo)).await?;
        let hook: HookResponse = response
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))?;

        info!(owner = %owner, repo = %repo, hook_id = hook.id, "Created webhook");
        Ok(hook.id)
    }

    async fn delete_hook(&self, owner: &str, repo: &str, hook_id: i64) -> dockyard_core::Result<()> {
        let url = self.url(&format!("/repos/{}/{}/hooks/{}", owner, repo, hook_id));
        let response = self
            .request(reqwest::Method::DELETE, &url)
            .send()
            .await
            .map_err(GitHubError::from)?;
        Self::check(response, &format!("hook {} of {}/{}", hook_id, owner, repo)).await?;

        info!(owner = %owner, repo = %repo, hook_id, "Deleted webhook");
        Ok(())
    }

    async fn list_repositories(&self) -> dockyard_core::Result<Vec<RepositorySummary>> {
        let mut repositories = Vec::new();
        let mut page = 1;
        loop {
            let repos = self.list_repos_page(page).await?;
            let last = repos.len() < PAGE_SIZE;
            repositories.extend(repos.into_iter().map(|r| RepositorySummary {
                owner: r.owner.login,
                name: r.name,
                full_name: r.full_name,
                clone_url: r.clone_url,
                private: r.private,
                default_branch: r.default_branch,
            }));
            if last {
                break;
            }
            page += 1;
        }
        Ok(repositories)
    }
}

/// Creates per-token clients sharing one connection pool and the configured
/// API base URL and hook settings.
pub struct GitHubClientFactory {
    client: reqwest::Client,
    api_url: String,
    hooks: HookSettings,
}

impl GitHubClientFactory {
    pub fn new(config: &GitHubConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            hooks: HookSettings {
                events: config.events.clone(),
                events_url: config.events_url.clone(),
                secret: config.webhook_secret.clone(),
            },
        }
    }

    /// A concrete client, for callers that need more than [`SourceControl`].
    pub fn github_client(&self, access_token: &str) -> GitHubClient {
        GitHubClient {
            client: self.client.clone(),
            api_url: self.api_url.clone(),
            access_token: access_token.to_string(),
            hooks: self.hooks.clone(),
        }
    }
}

impl SourceControlFactory for GitHubClientFactory {
    fn client(&self, access_token: &str) -> Arc<dyn SourceControl> {
        Arc::new(self.github_client(access_token))
    }
}
