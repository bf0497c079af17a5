use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::verification::DocumentVerification;
use crate::services::verification::{self, UploadDocumentRequest, UploadOutcome};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/verification/documents", post(upload).get(list_own))
}

#[utoipa::path(
    post,
    path = "/api/v1/verification/documents",
    tag = "verification",
    security(("bearerAuth" = [])),
    request_body = UploadDocumentRequest,
    responses(
        (status = 201, description = "Document stored and scored", body = UploadOutcome),
        (status = 400, description = "Bad content or unsupported format", body = ErrorResponse),
    )
)]
pub async fn upload(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<UploadDocumentRequest>,
) -> Result<(StatusCode, Json<UploadOutcome>), AppError> {
    let outcome = verification::upload(&state, user.id, payload, Utc::now())?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn list_own(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Json<Vec<DocumentVerification>> {
    Json(verification::for_user(&state, user.id))
}
