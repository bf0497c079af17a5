use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::rating::Rating;
use crate::services::ratings::{self, CreateRatingRequest, RatingsForUser};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ratings", post(create_rating))
        .route("/ratings/given", get(given))
        .route("/ratings/users/:id", get(received))
}

#[utoipa::path(
    post,
    path = "/api/v1/ratings",
    tag = "ratings",
    security(("bearerAuth" = [])),
    request_body = CreateRatingRequest,
    responses(
        (status = 201, description = "Rating recorded", body = Rating),
        (status = 409, description = "Already rated or shipment not delivered", body = ErrorResponse),
    )
)]
pub async fn create_rating(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateRatingRequest>,
) -> Result<(StatusCode, Json<Rating>), AppError> {
    let rating = ratings::create(&state, user.id, payload, Utc::now())?;
    Ok((StatusCode::CREATED, Json(rating)))
}

#[utoipa::path(
    get,
    path = "/api/v1/ratings/users/{id}",
    tag = "ratings",
    params(("id" = Uuid, Path, description = "Rated user id")),
    responses((status = 200, description = "Ratings received and their average", body = RatingsForUser))
)]
pub async fn received(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RatingsForUser>, AppError> {
    if !state.users.contains_key(&id) {
        return Err(AppError::NotFound(format!("user {id} not found")));
    }
    Ok(Json(ratings::received(&state, id)))
}

async fn given(State(state): State<Arc<AppState>>, user: AuthUser) -> Json<Vec<Rating>> {
    Json(ratings::given(&state, user.id))
}
