//! GitHub webhook payloads.

use dockyard_core::{Event, EventType, PullRequest};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info};

use crate::GitHubError;

const TAG_PREFIX: &str = "refs/tags/";
const BRANCH_PREFIX: &str = "refs/heads/";

#[derive(Debug, Deserialize)]
struct PayloadRepository {
    name: String,
    owner: PayloadOwner,
    clone_url: String,
}

/// Push payloads carry `name`, other events carry `login`.
#[derive(Debug, Deserialize)]
struct PayloadOwner {
    login: Option<String>,
    name: Option<String>,
}

impl PayloadOwner {
    fn organization(&self) -> Result<String, GitHubError> {
        self.login
            .clone()
            .or_else(|| self.name.clone())
            .ok_or_else(|| GitHubError::Payload("repository owner has no login".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct HeadCommit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    deleted: bool,
    base_ref: Option<String>,
    head_commit: Option<HeadCommit>,
    after: Option<String>,
    repository: PayloadRepository,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    action: String,
    number: u64,
    pull_request: PullRequestDetails,
    repository: PayloadRepository,
}

#[derive(Debug, Deserialize)]
struct PullRequestDetails {
    head: PullRequestRef,
    base: PullRequestRef,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

fn branch_name(git_ref: &str) -> String {
    git_ref
        .strip_prefix(BRANCH_PREFIX)
        .unwrap_or(git_ref)
        .to_string()
}

fn parse_push(body: &[u8]) -> Result<Option<Event>, GitHubError> {
    let payload: PushPayload =
        serde_json::from_slice(body).map_err(|e| GitHubError::Payload(e.to_string()))?;

    if payload.deleted {
        debug!(git_ref = %payload.git_ref, "Ignoring deleted ref");
        return Ok(None);
    }

    let revision = payload
        .head_commit
        .map(|c| c.id)
        .or(payload.after)
        .ok_or_else(|| GitHubError::Payload("push without head commit".to_string()))?;

    let (event_type, branch) = if payload.git_ref.starts_with(TAG_PREFIX) {
        let branch = payload
            .base_ref
            .as_deref()
            .map(branch_name)
            .unwrap_or_default();
        (EventType::Tag, branch)
    } else {
        (EventType::Push, branch_name(&payload.git_ref))
    };

    Ok(Some(Event {
        event_type,
        branch,
        organization: payload.repository.owner.organization()?,
        repository: payload.repository.name,
        clone_url: payload.repository.clone_url,
        revision,
        pull_request: None,
    }))
}

fn parse_pull_request(body: &[u8]) -> Result<Option<Event>, GitHubError> {
    let payload: PullRequestPayload =
        serde_json::from_slice(body).map_err(|e| GitHubError::Payload(e.to_string()))?;

    if payload.action == "closed" {
        debug!(number = payload.number, "Ignoring closed pull request");
        return Ok(None);
    }

    Ok(Some(Event {
        event_type: EventType::Pull,
        branch: payload.pull_request.base.git_ref,
        organization: payload.repository.owner.organization()?,
        repository: payload.repository.name,
        clone_url: payload.repository.clone_url,
        revision: format!("pull/{}/head", payload.number),
        pull_request: Some(PullRequest {
            number: payload.number,
            head_sha: payload.pull_request.head.sha,
        }),
    }))
}

/// Parse a delivery given its `X-GitHub-Event` header.
///
/// Returns `Ok(None)` for deliveries that never start a build: deleted refs,
/// closed pull requests, and any other event type.
pub fn parse_event(event_type: &str, body: &[u8]) -> Result<Option<Event>, GitHubError> {
    match event_type {
        "push" => parse_push(body),
        "pull_request" => parse_pull_request(body),
        other => {
            info!(event = %other, "Ignoring unhandled event type");
            Ok(None)
        }
    }
}

/// Verify an `X-Hub-Signature-256` header (`sha256=<hex>`) against the body.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}
