//! Webhook registration per repository.
//!
//! The access token supplied at registration is stored with the hook and
//! used for every build of that repository.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use dockyard_core::Error;
use dockyard_db::HookRecord;
use serde::Deserialize;
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/organizations/{org}/hooks", get(list_hooks))
        .route(
            "/organizations/{org}/repositories/{repo}/hook",
            post(create_hook).delete(delete_hook),
        )
}

#[derive(Debug, Deserialize)]
struct CreateHookRequest {
    access_token: String,
}

async fn list_hooks(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> Result<Json<Vec<HookRecord>>, ApiError> {
    Ok(Json(state.hooks.list_hooks(&org).await?))
}

async fn create_hook(
    State(state): State<AppState>,
    Path((org, repo)): Path<(String, String)>,
    Json(req): Json<CreateHookRequest>,
) -> Result<(StatusCode, Json<HookRecord>), ApiError> {
    if req.access_token.trim().is_empty() {
        return Err(ApiError::BadRequest("access_token is required".to_string()));
    }
    if state.hooks.get_hook(&org, &repo).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "{}/{} already has a hook",
            org, repo
        )));
    }

    let source_control = state.source_control.client(&req.access_token);
    let id = source_control.create_hook(&org, &repo).await?;
    let hook = HookRecord {
        id,
        organization: org,
        repository: repo,
        access_token: req.access_token,
        created_at: Utc::now(),
    };
    state.hooks.create_hook(&hook).await?;

    info!(org = %hook.organization, repo = %hook.repository, hook_id = hook.id, "Hook registered");
    Ok((StatusCode::CREATED, Json(hook)))
}

async fn delete_hook(
    State(state): State<AppState>,
    Path((org, repo)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let hook = state
        .hooks
        .get_hook(&org, &repo)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no hook registered for {}/{}", org, repo)))?;

    let source_control = state.source_control.client(&hook.access_token);
    match source_control.delete_hook(&org, &repo, hook.id).await {
        Ok(()) => {}
        Err(Error::NotFound(msg)) => {
            warn!(org = %org, repo = %repo, hook_id = hook.id, reason = %msg, "Hook already gone upstream");
        }
        Err(e) => return Err(e.into()),
    }
    state.hooks.delete_hook(hook.id).await?;

    info!(org = %org, repo = %repo, hook_id = hook.id, "Hook removed");
    Ok(StatusCode::NO_CONTENT)
}
