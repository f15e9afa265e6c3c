//! Ledger API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use ledger_api::config::Config;
use ledger_api::error::AppError;
use ledger_api::state::AppState;
use ledger_api::{app, telemetry};
use ledger_core::clock::SystemClock;
use ledger_core::notification::UuidNotificationIds;
use ledger_service::{
    DEFAULT_SUBJECT, InProcessBroker, LedgerService, spawn_logging_subscriber,
    spawn_notification_pipeline,
};
use ledger_store::PgLedgerStore;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    info!("Starting ledger API server");

    // Create database connection pool and bring the schema up to date.
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgLedgerStore::new(pool.clone()));
    store.migrate().await?;

    // Notification pipeline on the in-process broker.
    let clock = Arc::new(SystemClock);
    let broker = Arc::new(InProcessBroker::new(
        DEFAULT_SUBJECT,
        config.ledger.notification_queue_capacity,
    ));
    let subscriber = spawn_logging_subscriber(broker.subscribe());
    let (queue, pipeline) = spawn_notification_pipeline(
        store.clone(),
        broker,
        clock.clone(),
        config.ledger.notification_queue_capacity,
    );

    let service = Arc::new(LedgerService::new(
        store,
        clock,
        Arc::new(UuidNotificationIds),
        queue,
        config.ledger.clone(),
    ));
    let router = app(AppState::new(service));

    // Start server.
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last service handle; with it gone the
    // notification queue is closed and the pipeline drains.
    pipeline.shutdown().await;
    if let Err(err) = subscriber.await {
        tracing::error!(error = %err, "notification subscriber panicked");
    }
    pool.close().await;
    info!("Ledger API server stopped");
    telemetry.shutdown();

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
