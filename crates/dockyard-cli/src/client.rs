//! Minimal client for the server's HTTP API.

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(server: &str) -> Result<Self> {
        let mut base = Url::parse(server).with_context(|| format!("Invalid server URL {}", server))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    /// `path` is relative to the server's `/api/`; segments must already be encoded.
    pub fn url(&self, path: &str) -> Result<Url> {
        let url = self.base.join("api/")?.join(path)?;
        debug!(url = %url, "API request");
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);
        bail!("{}: {}", status, message)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.get(self.url(path)?).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let response = self.http.get(self.url(path)?).send().await?;
        Ok(Self::check(response).await?.bytes().await?.to_vec())
    }

    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T> {
        let response = self.http.post(self.url(path)?).json(body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self.http.delete(self.url(path)?).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Path segment safe for [`ApiClient::url`].
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
