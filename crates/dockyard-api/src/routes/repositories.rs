//! Repositories visible to an access token, grouped by owner, for choosing
//! what to register.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use dockyard_core::RepositorySummary;
use serde::Serialize;
use std::collections::HashSet;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/repositories", get(list_repositories))
}

/// One owner's repositories.
#[derive(Debug, Serialize)]
pub struct Organization {
    pub name: String,
    pub repositories: Vec<HookedRepository>,
}

#[derive(Debug, Serialize)]
pub struct HookedRepository {
    #[serde(flatten)]
    pub repository: RepositorySummary,
    /// A hook is already registered for this repository.
    pub hooked: bool,
}

/// Token from `Authorization: Bearer <token>` or `Authorization: token <token>`.
fn access_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("Authorization")?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("token "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Group repositories by owner, keeping the order owners are first seen in.
fn group_by_owner(repositories: Vec<RepositorySummary>) -> Vec<Organization> {
    let mut organizations: Vec<Organization> = Vec::new();
    for repository in repositories {
        let entry = HookedRepository {
            repository,
            hooked: false,
        };
        match organizations
            .iter_mut()
            .find(|org| org.name == entry.repository.owner)
        {
            Some(org) => org.repositories.push(entry),
            None => organizations.push(Organization {
                name: entry.repository.owner.clone(),
                repositories: vec![entry],
            }),
        }
    }
    organizations
}

async fn list_repositories(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Organization>>, ApiError> {
    let token = access_token(&headers)
        .ok_or_else(|| ApiError::Unauthorized("missing access token".to_string()))?;
    let repositories = state.source_control.client(token).list_repositories().await?;

    let mut organizations = group_by_owner(repositories);
    for org in &mut organizations {
        let hooked: HashSet<String> = state
            .hooks
            .list_hooks(&org.name)
            .await?
            .into_iter()
            .map(|hook| hook.repository)
            .collect();
        for entry in &mut org.repositories {
            entry.hooked = hooked.contains(&entry.repository.name);
        }
    }
    Ok(Json(organizations))
}
