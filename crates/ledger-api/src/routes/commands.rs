//! Intake for wire commands.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::post};
use ledger_core::command::Command;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /
///
/// Hands the command to the `CommandConsumer`, which logs the outcome.
async fn submit_command(
    State(state): State<AppState>,
    Json(command): Json<Command>,
) -> Result<StatusCode, ApiError> {
    state.consumer.handle(&command).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the router for command intake.
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(submit_command))
}
