use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::{AdminUser, AuthUser};
use crate::services::analytics::{self, AdminDashboard, UserDashboard};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics/dashboard", get(dashboard))
        .route("/analytics/admin", get(admin_dashboard))
}

#[utoipa::path(
    get,
    path = "/api/v1/analytics/dashboard",
    tag = "analytics",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Caller's activity summary", body = UserDashboard))
)]
pub async fn dashboard(State(state): State<Arc<AppState>>, user: AuthUser) -> Json<UserDashboard> {
    Json(analytics::user_dashboard(&state, user.id))
}

#[utoipa::path(
    get,
    path = "/api/v1/analytics/admin",
    tag = "analytics",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Platform-wide counters", body = AdminDashboard))
)]
pub async fn admin_dashboard(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> Json<AdminDashboard> {
    Json(analytics::admin_dashboard(&state))
}
