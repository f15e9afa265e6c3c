//! Routes for accounts, balances and transfers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{
    Json, Router,
    routing::{get, post},
};
use ledger_core::account::{AccountId, Balance};
use ledger_core::event::Event;
use serde::Deserialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /accounts.
#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    /// Caller-assigned id of the new account.
    pub account_id: AccountId,
}

/// Request body for POST /accounts/{id}/deposit and /withdraw.
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    /// Amount in minor units.
    pub amount: i64,
}

/// Request body for POST /transfers.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Account to debit.
    pub from_account_id: AccountId,
    /// Account to credit.
    pub to_account_id: AccountId,
    /// Amount in minor units.
    pub amount: i64,
}

/// POST /accounts
#[instrument(skip(state, request), fields(account_id = %request.account_id))]
async fn open_account(
    State(state): State<AppState>,
    Json(request): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let event = state.service.open_account(request.account_id).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// POST /accounts/{id}/deposit
#[instrument(skip(state, request), fields(amount = request.amount))]
async fn deposit(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
    Json(request): Json<AmountRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .deposit(AccountId(account_id), request.amount)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /accounts/{id}/withdraw
#[instrument(skip(state, request), fields(amount = request.amount))]
async fn withdraw(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
    Json(request): Json<AmountRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .withdraw(AccountId(account_id), request.amount)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /transfers
#[instrument(
    skip(state, request),
    fields(from = %request.from_account_id, to = %request.to_account_id, amount = request.amount)
)]
async fn transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .transfer(request.from_account_id, request.to_account_id, request.amount)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /accounts/{id}/balance
async fn get_balance(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> Result<Json<Balance>, ApiError> {
    let balance = state.service.get_balance(AccountId(account_id)).await?;
    Ok(Json(balance))
}

/// GET /accounts/{id}/events
async fn list_events(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = state
        .service
        .events_for_account(AccountId(account_id))
        .await?;
    Ok(Json(events))
}

/// Returns the router for accounts and transfers.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(open_account))
        .route("/accounts/{id}/deposit", post(deposit))
        .route("/accounts/{id}/withdraw", post(withdraw))
        .route("/accounts/{id}/balance", get(get_balance))
        .route("/accounts/{id}/events", get(list_events))
        .route("/transfers", post(transfer))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use ledger_core::store::LedgerStore;
    use ledger_service::{LedgerConfig, LedgerService, NotificationQueue};
    use ledger_test_support::{
        FailingLedgerStore, FixedClock, InMemoryLedgerStore, SequenceNotificationIds,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn app_state_with(store: Arc<dyn LedgerStore>) -> AppState {
        let (queue, _events) = NotificationQueue::channel(16);
        let service = LedgerService::new(
            store,
            Arc::new(FixedClock::default()),
            Arc::new(SequenceNotificationIds::new()),
            queue,
            LedgerConfig::default(),
        );
        AppState::new(Arc::new(service))
    }

    fn post(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body_bytes).unwrap()
    }

    #[tokio::test]
    async fn test_open_account_returns_201_with_event() {
        // Arrange
        let app = router().with_state(app_state_with(Arc::new(InMemoryLedgerStore::new())));
        let request = post("/accounts", &serde_json::json!({ "account_id": 1 }));

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["type"], "open");
        assert_eq!(json["from_user_id"], 1);
        assert_eq!(json["queue_id"], "notification-1");
    }

    #[tokio::test]
    async fn test_deposit_returns_204_and_updates_balance() {
        // Arrange
        let store = InMemoryLedgerStore::new();
        store.seed_balance(AccountId(1), 5);
        let app = router().with_state(app_state_with(Arc::new(store.clone())));
        let request = post("/accounts/1/deposit", &serde_json::json!({ "amount": 10 }));

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(store.balances()[&AccountId(1)], 15);
    }

    #[tokio::test]
    async fn test_withdraw_beyond_balance_returns_422() {
        // Arrange
        let store = InMemoryLedgerStore::new();
        store.seed_balance(AccountId(1), 2);
        let app = router().with_state(app_state_with(Arc::new(store)));
        let request = post("/accounts/1/withdraw", &serde_json::json!({ "amount": 3 }));

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"], "negative_balance");
    }

    #[tokio::test]
    async fn test_negative_deposit_returns_400() {
        let app = router().with_state(app_state_with(Arc::new(FailingLedgerStore)));
        let request = post("/accounts/1/deposit", &serde_json::json!({ "amount": -3 }));

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "negative_amount");
    }

    #[tokio::test]
    async fn test_transfer_to_unknown_account_returns_404() {
        let store = InMemoryLedgerStore::new();
        store.seed_balance(AccountId(1), 10);
        let app = router().with_state(app_state_with(Arc::new(store)));
        let request = post(
            "/transfers",
            &serde_json::json!({ "from_account_id": 1, "to_account_id": 2, "amount": 3 }),
        );

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], "user_not_found");
    }

    #[tokio::test]
    async fn test_get_balance_returns_account_and_balance() {
        let store = InMemoryLedgerStore::new();
        store.seed_balance(AccountId(4), 42);
        let app = router().with_state(app_state_with(Arc::new(store)));
        let request = Request::builder()
            .uri("/accounts/4/balance")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!({ "account_id": 4, "balance": 42 }));
    }

    #[tokio::test]
    async fn test_storage_failure_returns_500() {
        let app = router().with_state(app_state_with(Arc::new(FailingLedgerStore)));
        let request = Request::builder()
            .uri("/accounts/1/events")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "storage_error");
    }
}
