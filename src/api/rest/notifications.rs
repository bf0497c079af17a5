use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::notification::{Channel, Notification};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/:id/read", post(mark_read))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationFilter {
    /// `true` lists unread notifications only.
    #[serde(default)]
    pub unread: bool,
    pub channel: Option<Channel>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationCount {
    pub count: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    tag = "notifications",
    security(("bearerAuth" = [])),
    params(NotificationFilter),
    responses((status = 200, description = "Newest first", body = [Notification]))
)]
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<NotificationFilter>,
) -> Json<Vec<Notification>> {
    let mut list: Vec<Notification> = state
        .notifications
        .iter()
        .filter(|n| n.user_id == user.id)
        .filter(|n| !filter.unread || !n.is_read)
        .filter(|n| filter.channel.is_none_or(|channel| n.channel == channel))
        .map(|n| n.value().clone())
        .collect();
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(list)
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Json<NotificationCount> {
    let count = state
        .notifications
        .iter()
        .filter(|n| n.user_id == user.id && !n.is_read)
        .count();
    Json(NotificationCount { count })
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let mut notification = state
        .notifications
        .get_mut(&id)
        .filter(|n| n.user_id == user.id)
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;
    notification.mark_read(Utc::now());
    Ok(Json(notification.clone()))
}

async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Json<NotificationCount> {
    let now = Utc::now();
    let mut count = 0;
    for mut notification in state.notifications.iter_mut() {
        if notification.user_id == user.id && !notification.is_read {
            notification.mark_read(now);
            count += 1;
        }
    }
    Json(NotificationCount { count })
}
