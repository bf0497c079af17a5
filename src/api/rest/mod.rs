pub mod admin;
pub mod analytics;
pub mod chat;
pub mod documents;
pub mod i18n;
pub mod matching;
pub mod notifications;
pub mod payments;
pub mod ratings;
pub mod shipments;
pub mod trips;
pub mod users;
pub mod verification;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::docs::ApiDoc;
use crate::models::notification::NotificationStatus;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(users::router())
        .merge(shipments::router())
        .merge(trips::router())
        .merge(matching::router())
        .merge(payments::router())
        .merge(chat::router())
        .merge(notifications::router())
        .merge(documents::router())
        .merge(verification::router())
        .merge(ratings::router())
        .merge(i18n::router())
        .merge(analytics::router())
        .merge(admin::router())
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(Redoc::with_url("/redoc", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    users: usize,
    shipments: usize,
    trips: usize,
    matches: usize,
    pending_notifications: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        users: state.users.len(),
        shipments: state.shipments.len(),
        trips: state.trips.len(),
        matches: state.matches.len(),
        pending_notifications: state
            .notifications
            .iter()
            .filter(|n| n.status == NotificationStatus::Pending)
            .count(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
