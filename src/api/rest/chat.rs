use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::chat::Message;
use crate::services::chat::{self, ConversationSummary, PostMessageRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat/conversations", get(list_conversations))
        .route("/chat/unread-count", get(unread_count))
        .route(
            "/chat/conversations/:id/messages",
            get(list_messages).post(post_message),
        )
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCount {
    pub unread: usize,
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Json<Vec<ConversationSummary>> {
    Json(chat::conversations_for(&state, user.id))
}

#[utoipa::path(
    get,
    path = "/api/v1/chat/conversations/{id}/messages",
    tag = "chat",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Messages oldest first", body = [Message]),
        (status = 404, description = "Unknown conversation", body = ErrorResponse),
    )
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(chat::read_messages(&state, id, user.id, Utc::now())?))
}

#[utoipa::path(
    post,
    path = "/api/v1/chat/conversations/{id}/messages",
    tag = "chat",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Conversation id")),
    request_body = PostMessageRequest,
    responses(
        (status = 201, description = "Message posted", body = Message),
        (status = 409, description = "Conversation closed", body = ErrorResponse),
    )
)]
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let message = chat::post_message(&state, id, user.id, payload, Utc::now())?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn unread_count(State(state): State<Arc<AppState>>, user: AuthUser) -> Json<UnreadCount> {
    Json(UnreadCount {
        unread: chat::unread_count(&state, user.id),
    })
}
