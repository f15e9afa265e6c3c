//! Notification reconciliation.

use axum::extract::State;
use axum::{Json, Router, routing::post};
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Response body for POST /redrive.
#[derive(Debug, Serialize)]
pub struct RedriveResponse {
    /// Unconfirmed events handed back to the notification pipeline.
    pub enqueued: usize,
}

/// POST /redrive
async fn redrive(State(state): State<AppState>) -> Result<Json<RedriveResponse>, ApiError> {
    let enqueued = state.service.redrive_unconfirmed().await?;
    info!(enqueued, "redrive requested");
    Ok(Json(RedriveResponse { enqueued }))
}

/// Returns the router for notification maintenance.
pub fn router() -> Router<AppState> {
    Router::new().route("/redrive", post(redrive))
}
