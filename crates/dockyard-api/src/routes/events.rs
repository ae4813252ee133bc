//! Webhook ingestion.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use dockyard_github::{parse_event, verify_signature};
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", post(receive_event))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Accept a GitHub delivery and start its build in the background.
///
/// Deliveries that never start a build are acknowledged with `200` as well.
async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let event_type = header(&headers, "X-GitHub-Event").unwrap_or("unknown");
    let delivery = header(&headers, "X-GitHub-Delivery").unwrap_or("-");

    if let Some(secret) = &state.webhook_secret {
        let signature = header(&headers, "X-Hub-Signature-256");
        if !verify_signature(secret, &body, signature) {
            warn!(event = %event_type, delivery = %delivery, "Invalid webhook signature");
            return Err(ApiError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    info!(event = %event_type, delivery = %delivery, "Received GitHub webhook");

    let Some(event) = parse_event(event_type, &body)? else {
        return Ok(StatusCode::OK);
    };

    info!(
        org = %event.organization,
        repo = %event.repository,
        event = %event.event_type,
        branch = %event.branch,
        revision = %event.revision,
        "Dispatching build"
    );
    // Detached; the build task logs its own outcome.
    drop(state.orchestrator.dispatch(event));

    Ok(StatusCode::OK)
}
