use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AdminUser;
use crate::error::{AppError, FieldErrors};
use crate::models::matching::{MatchingRule, ScoreWeights};
use crate::models::payment::Transaction;
use crate::models::user::{Role, User};
use crate::models::verification::DocumentVerification;
use crate::services::{payments, verification};
use crate::services::verification::{ReviewRequest, ReviewSummary};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id/active", post(set_active))
        .route("/admin/users/:id/verifications", get(user_verifications))
        .route("/admin/matching-rule", get(get_rule).put(update_rule))
        .route("/admin/deposits/:id/confirm", post(confirm_deposit))
        .route("/admin/verifications", get(review_queue))
        .route("/admin/verifications/summary", get(review_summary))
        .route("/admin/verifications/:id/review", post(review))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRuleRequest {
    pub name: Option<String>,
    pub min_compatibility_score: Option<f64>,
    pub weights: Option<ScoreWeights>,
    pub enable_auto_acceptance: Option<bool>,
    pub auto_acceptance_threshold: Option<f64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    tag = "admin",
    security(("bearerAuth" = [])),
    params(UserFilter),
    responses(
        (status = 200, description = "Users, newest first", body = [User]),
        (status = 403, description = "Admin role required", body = ErrorResponse),
    )
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(filter): Query<UserFilter>,
) -> Json<Vec<User>> {
    let mut users: Vec<User> = state
        .users
        .iter()
        .filter(|u| filter.role.is_none_or(|role| u.role == role))
        .filter(|u| filter.is_active.is_none_or(|active| u.is_active == active))
        .map(|u| u.value().clone())
        .collect();
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(users)
}

async fn set_active(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<User>, AppError> {
    if id == admin.id && !payload.is_active {
        return Err(AppError::BadRequest(
            "you cannot deactivate your own account".to_string(),
        ));
    }
    let mut user = state
        .users
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
    user.is_active = payload.is_active;
    user.updated_at = Utc::now();
    info!(user_id = %id, is_active = payload.is_active, admin_id = %admin.id, "user activation changed");
    Ok(Json(user.clone()))
}

async fn user_verifications(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Json<Vec<DocumentVerification>> {
    Json(verification::for_user(&state, id))
}

pub async fn get_rule(State(state): State<Arc<AppState>>, _admin: AdminUser) -> Json<MatchingRule> {
    Json(state.matching_rule())
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/matching-rule",
    tag = "admin",
    security(("bearerAuth" = [])),
    request_body = UpdateRuleRequest,
    responses(
        (status = 200, description = "Rule updated", body = MatchingRule),
        (status = 400, description = "Invalid weights or thresholds", body = ErrorResponse),
    )
)]
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<UpdateRuleRequest>,
) -> Result<Json<MatchingRule>, AppError> {
    let mut errors = FieldErrors::new();
    if let Some(score) = payload.min_compatibility_score {
        errors.check(
            (0.0..=100.0).contains(&score),
            "min_compatibility_score",
            "score must be between 0 and 100",
        );
    }
    if let Some(threshold) = payload.auto_acceptance_threshold {
        errors.check(
            (0.0..=100.0).contains(&threshold),
            "auto_acceptance_threshold",
            "threshold must be between 0 and 100",
        );
    }
    if let Some(weights) = &payload.weights {
        errors.check(
            weights.is_valid(),
            "weights",
            "weights must be non-negative with a positive sum",
        );
    }
    if let Some(name) = &payload.name {
        errors.check(!name.trim().is_empty(), "name", "name cannot be empty");
    }
    errors.into_result()?;

    let mut rule = state.matching_rule();
    if let Some(name) = payload.name {
        rule.name = name.trim().to_string();
    }
    if let Some(score) = payload.min_compatibility_score {
        rule.min_compatibility_score = score;
    }
    if let Some(weights) = payload.weights {
        rule.weights = weights;
    }
    if let Some(enabled) = payload.enable_auto_acceptance {
        rule.enable_auto_acceptance = enabled;
    }
    if let Some(threshold) = payload.auto_acceptance_threshold {
        rule.auto_acceptance_threshold = threshold;
    }
    rule.updated_at = Utc::now();
    state.set_matching_rule(rule.clone());

    info!(admin_id = %admin.id, rule = %rule.name, "matching rule updated");
    Ok(Json(rule))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/deposits/{id}/confirm",
    tag = "admin",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Pending deposit transaction id")),
    responses(
        (status = 200, description = "Deposit completed and wallet credited", body = Transaction),
        (status = 409, description = "Not a pending deposit", body = ErrorResponse),
    )
)]
pub async fn confirm_deposit(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    Ok(Json(payments::confirm_deposit(&state, id, Utc::now())?))
}

pub async fn review_queue(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Json<Vec<DocumentVerification>> {
    Json(verification::review_queue(&state))
}

async fn review_summary(State(state): State<Arc<AppState>>, _admin: AdminUser) -> Json<ReviewSummary> {
    Json(verification::summary(&state))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/verifications/{id}/review",
    tag = "admin",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Verification id")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Decision recorded", body = DocumentVerification),
        (status = 400, description = "Rejection without a reason", body = ErrorResponse),
    )
)]
pub async fn review(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<DocumentVerification>, AppError> {
    Ok(Json(verification::review(
        &state,
        id,
        admin.id,
        payload,
        Utc::now(),
    )?))
}
