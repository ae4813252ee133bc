//! API routes.

pub mod builds;
pub mod events;
pub mod health;
pub mod hooks;
pub mod repositories;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .merge(events::router())
        .merge(builds::router())
        .merge(hooks::router())
        .merge(repositories::router())
}
