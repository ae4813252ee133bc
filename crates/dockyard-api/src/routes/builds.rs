//! Read API over builds and their logs.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use dockyard_core::{Build, BuildId};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

const RECENT_LIMIT: i64 = 10;
const REPOSITORY_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/builds", get(list_recent))
        .route(
            "/organizations/{org}/repositories/{repo}/builds",
            get(list_by_repository),
        )
        .route(
            "/organizations/{org}/repositories/{repo}/builds/{build_id}",
            get(get_build),
        )
        .route(
            "/organizations/{org}/repositories/{repo}/builds/{build_id}/logs",
            get(get_logs),
        )
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

impl ListQuery {
    fn limit(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

async fn list_recent(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Build>>, ApiError> {
    let builds = state.builds.list_recent(query.limit(RECENT_LIMIT)).await?;
    Ok(Json(builds))
}

async fn list_by_repository(
    State(state): State<AppState>,
    Path((org, repo)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Build>>, ApiError> {
    let builds = state
        .builds
        .list_by_repository(&org, &repo, query.limit(REPOSITORY_LIMIT))
        .await?;
    Ok(Json(builds))
}

/// The build, provided it belongs to `org/repo`.
async fn find_build(
    state: &AppState,
    org: &str,
    repo: &str,
    build_id: &str,
) -> Result<Build, ApiError> {
    let id: BuildId = build_id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid build id {}: {}", build_id, e)))?;
    let build = state.builds.get_build(id).await?;
    if build.organization != org || build.repository != repo {
        return Err(ApiError::NotFound(format!(
            "build {} in {}/{}",
            build_id, org, repo
        )));
    }
    Ok(build)
}

async fn get_build(
    State(state): State<AppState>,
    Path((org, repo, build_id)): Path<(String, String, String)>,
) -> Result<Json<Build>, ApiError> {
    Ok(Json(find_build(&state, &org, &repo, &build_id).await?))
}

/// Raw log bytes, complete or still growing.
async fn get_logs(
    State(state): State<AppState>,
    Path((org, repo, build_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let build = find_build(&state, &org, &repo, &build_id).await?;
    let log = state.logs.read_log(&build.log_path()).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], log))
}
