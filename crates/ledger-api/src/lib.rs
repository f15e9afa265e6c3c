//! Ledger API — HTTP surface, configuration and telemetry for the ledger
//! service.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::accounts::router())
        .nest("/api/v1/commands", routes::commands::router())
        .nest("/api/v1/notifications", routes::notifications::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
