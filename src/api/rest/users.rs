use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::auth::jwt::TokenPair;
use crate::error::AppError;
use crate::models::user::{PublicProfile, User, VerificationSummary};
use crate::services::users::{
    self, AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, UpdateProfileRequest,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/token/refresh", post(refresh))
        .route("/users/me", get(me).patch(update_me))
        .route("/users/me/verification", get(verification_status))
        .route("/users/otp/send", post(send_otp))
        .route("/users/otp/verify", post(verify_otp))
        .route("/users/:id/profile", get(public_profile))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendOtpRequest {
    pub phone_number: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OtpSentResponse {
    pub message: String,
    pub expires_in_minutes: i64,
    /// Only present when code echo is enabled for local testing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_code: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub phone_number: String,
    pub code: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/users/register",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid registration data", body = ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let response = users::register(&state, payload, Utc::now())?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/login",
    tag = "users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(users::login(&state, payload)?))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/token/refresh",
    tag = "users",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Invalid refresh token", body = ErrorResponse),
    )
)]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    Ok(Json(users::refresh(&state, &payload.refresh_token)?))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "users",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Authentication required", body = ErrorResponse),
    )
)]
pub async fn me(State(state): State<Arc<AppState>>, user: AuthUser) -> Result<Json<User>, AppError> {
    Ok(Json(user.load(&state)?))
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(users::update_profile(
        &state,
        user.id,
        payload,
        Utc::now(),
    )?))
}

async fn verification_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<VerificationSummary>, AppError> {
    Ok(Json(user.load(&state)?.verification()))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/otp/send",
    tag = "users",
    security(("bearerAuth" = [])),
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "Code sent by SMS", body = OtpSentResponse),
        (status = 429, description = "Too many codes requested", body = ErrorResponse),
    )
)]
pub async fn send_otp(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<SendOtpRequest>,
) -> Result<Json<OtpSentResponse>, AppError> {
    let phone = payload.phone_number.trim();
    let code = users::send_phone_otp(&state, user.id, phone, Utc::now())?;

    Ok(Json(OtpSentResponse {
        message: format!("verification code sent to {phone}"),
        expires_in_minutes: state.config.otp_expiry_minutes,
        debug_code: state.config.otp_debug.then_some(code),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/otp/verify",
    tag = "users",
    security(("bearerAuth" = [])),
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Phone number verified", body = User),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse),
        (status = 429, description = "Code burned after repeated failures", body = ErrorResponse),
    )
)]
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(users::verify_phone_otp(
        &state,
        user.id,
        payload.phone_number.trim(),
        payload.code.trim(),
        Utc::now(),
    )?))
}

async fn public_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicProfile>, AppError> {
    let user = state
        .users
        .get(&id)
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
    Ok(Json(user.public_profile()))
}
