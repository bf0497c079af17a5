use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::document::{DocumentKind, GeneratedDocument};
use crate::services::documents;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/documents", post(generate).get(list_documents))
        .route("/documents/:id", get(get_document))
        .route("/documents/:id/html", get(document_html))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateDocumentRequest {
    pub shipment_id: Uuid,
    pub kind: DocumentKind,
}

#[utoipa::path(
    post,
    path = "/api/v1/documents",
    tag = "documents",
    security(("bearerAuth" = [])),
    request_body = GenerateDocumentRequest,
    responses(
        (status = 201, description = "Document generated or previously generated", body = GeneratedDocument),
        (status = 409, description = "Receipt requested before delivery", body = ErrorResponse),
    )
)]
pub async fn generate(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<GenerateDocumentRequest>,
) -> Result<(StatusCode, Json<GeneratedDocument>), AppError> {
    let document = documents::generate(
        &state,
        user.id,
        payload.shipment_id,
        payload.kind,
        Utc::now(),
    )?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Json<Vec<GeneratedDocument>> {
    Json(documents::owned_by(&state, user.id))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<GeneratedDocument>, AppError> {
    Ok(Json(documents::get_owned(&state, user.id, id)?))
}

async fn document_html(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let document = documents::get_owned(&state, user.id, id)?;
    let disposition = format!("inline; filename=\"{}.html\"", document.number);
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Html(document.html)))
}
