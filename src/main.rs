use std::sync::Arc;

use chrono::Utc;
use kleer_logistics::api;
use kleer_logistics::config::Config;
use kleer_logistics::engine::notifier::run_notification_dispatcher;
use kleer_logistics::engine::sweeper::run_maintenance;
use kleer_logistics::error::AppError;
use kleer_logistics::observability::logging;
use kleer_logistics::services::users::seed_admin;
use kleer_logistics::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    logging::init(&config);

    let http_port = config.http_port;
    let admin = config.admin.clone();

    let (app_state, notification_rx) = AppState::new(config);
    let shared_state = Arc::new(app_state);

    if let Some(admin) = &admin {
        seed_admin(&shared_state, admin, Utc::now())?;
    }

    tokio::spawn(run_notification_dispatcher(
        shared_state.clone(),
        notification_rx,
    ));
    tokio::spawn(run_maintenance(shared_state.clone()));

    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
