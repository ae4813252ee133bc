//! Hook commands.

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;

use crate::client::{ApiClient, segment};

#[derive(Debug, Deserialize)]
struct Hook {
    id: i64,
    organization: String,
    repository: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

fn hook_path(org: &str, repo: &str) -> String {
    format!(
        "organizations/{}/repositories/{}/hook",
        segment(org),
        segment(repo)
    )
}

pub async fn list(server: &str, org: &str) -> Result<()> {
    let client = ApiClient::new(server)?;
    let hooks: Vec<Hook> = client
        .get_json(&format!("organizations/{}/hooks", segment(org)))
        .await?;
    if hooks.is_empty() {
        println!("No hooks registered for {}", org);
    }
    for hook in hooks {
        println!(
            "{:<12} {}/{}  {}",
            hook.id,
            hook.organization,
            hook.repository,
            hook.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub async fn register(server: &str, org: &str, repo: &str, token: &str) -> Result<()> {
    let client = ApiClient::new(server)?;
    let hook: Hook = client
        .post_json(&hook_path(org, repo), &json!({ "access_token": token }))
        .await?;
    println!("Registered hook {} for {}/{}", hook.id, hook.organization, hook.repository);
    Ok(())
}

pub async fn remove(server: &str, org: &str, repo: &str) -> Result<()> {
    let client = ApiClient::new(server)?;
    client.delete(&hook_path(org, repo)).await?;
    println!("Removed hook for {}/{}", org, repo);
    Ok(())
}
