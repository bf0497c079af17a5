use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::engine::matching::{self, DEFAULT_LIMIT};
use crate::error::{AppError, FieldErrors};
use crate::models::matching::{Match, MatchStatus, MatchingPreferences};
use crate::models::shipment::PackageType;
use crate::services::analytics::{self, MatchingStats};
use crate::state::AppState;

const MAX_LIMIT: usize = 50;
const MAX_RESPONSE_HOURS: u32 = 168;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/matching/shipments/:id/find", post(find_for_shipment))
        .route("/matching/trips/:id/find", post(find_for_trip))
        .route("/matching/matches", get(list_matches))
        .route("/matching/matches/:id", get(get_match))
        .route("/matching/matches/:id/accept", post(accept_match))
        .route("/matching/matches/:id/reject", post(reject_match))
        .route("/matching/matches/:id/delivery-otp", post(regenerate_otp))
        .route("/matching/matches/:id/confirm-delivery", post(confirm_delivery))
        .route(
            "/matching/preferences",
            get(get_preferences).put(update_preferences),
        )
        .route("/matching/stats", get(stats))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FindParams {
    /// Maximum number of candidates, 10 by default.
    pub limit: Option<usize>,
}

impl FindParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FindMatchesResponse {
    pub count: usize,
    pub matches: Vec<Match>,
    pub auto_accepted: Option<Match>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MatchFilter {
    pub status: Option<MatchStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AcceptResponse {
    #[serde(rename = "match")]
    pub accepted: Match,
    pub conversation_id: Uuid,
    /// Delivery code, returned to the sender only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_otp: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryOtpResponse {
    pub match_id: Uuid,
    pub delivery_otp: String,
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmDeliveryRequest {
    pub otp: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePreferencesRequest {
    pub auto_accept_threshold: Option<f64>,
    pub notify_on_match: Option<bool>,
    pub min_traveler_rating: Option<f64>,
    pub preferred_cities: Option<Vec<String>>,
    pub blacklisted_users: Option<Vec<Uuid>>,
    pub response_time_hours: Option<u32>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub accepts_fragile: Option<bool>,
    pub accepts_urgent: Option<bool>,
    pub max_price_per_kg: Option<Decimal>,
    pub preferred_package_types: Option<Vec<PackageType>>,
}

#[utoipa::path(
    post,
    path = "/api/v1/matching/shipments/{id}/find",
    tag = "matching",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Shipment id"), FindParams),
    responses(
        (status = 200, description = "Ranked candidate trips", body = FindMatchesResponse),
        (status = 409, description = "Shipment cannot be matched", body = ErrorResponse),
    )
)]
pub async fn find_for_shipment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(params): Query<FindParams>,
) -> Result<Json<FindMatchesResponse>, AppError> {
    let outcome =
        matching::find_matches_for_shipment(&state, &user, id, params.limit(), Utc::now())?;
    Ok(Json(FindMatchesResponse {
        count: outcome.matches.len(),
        matches: outcome.matches,
        auto_accepted: outcome.auto_accepted,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/matching/trips/{id}/find",
    tag = "matching",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Trip id"), FindParams),
    responses(
        (status = 200, description = "Ranked candidate shipments", body = FindMatchesResponse),
        (status = 403, description = "Not your trip", body = ErrorResponse),
    )
)]
pub async fn find_for_trip(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(params): Query<FindParams>,
) -> Result<Json<FindMatchesResponse>, AppError> {
    let matches = matching::find_matches_for_trip(&state, &user, id, params.limit(), Utc::now())?;
    Ok(Json(FindMatchesResponse {
        count: matches.len(),
        matches,
        auto_accepted: None,
    }))
}

pub async fn list_matches(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<MatchFilter>,
) -> Json<Vec<Match>> {
    let mut matches: Vec<Match> = state
        .matches
        .iter()
        .filter(|m| m.is_party(user.id))
        .filter(|m| filter.status.is_none_or(|status| m.status == status))
        .map(|m| m.value().clone())
        .collect();
    matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(matches)
}

async fn get_match(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Match>, AppError> {
    state
        .matches
        .get(&id)
        .filter(|m| m.is_party(user.id) || user.is_admin())
        .map(|m| Json(m.value().clone()))
        .ok_or_else(|| AppError::NotFound(format!("match {id} not found")))
}

#[utoipa::path(
    post,
    path = "/api/v1/matching/matches/{id}/accept",
    tag = "matching",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Match id")),
    responses(
        (status = 200, description = "Match accepted", body = AcceptResponse),
        (status = 409, description = "Match no longer pending or trip is full", body = ErrorResponse),
    )
)]
pub async fn accept_match(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AcceptResponse>, AppError> {
    let outcome = matching::accept(&state, id, Some(user.id), Utc::now())?;
    let is_sender = outcome.accepted.sender_id == user.id;
    Ok(Json(AcceptResponse {
        conversation_id: outcome.conversation_id,
        delivery_otp: is_sender.then_some(outcome.delivery_otp),
        accepted: outcome.accepted,
    }))
}

pub async fn reject_match(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<RejectRequest>>,
) -> Result<Json<Match>, AppError> {
    let reason = payload.and_then(|Json(req)| req.reason);
    Ok(Json(matching::reject(&state, id, user.id, reason, Utc::now())?))
}

async fn regenerate_otp(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryOtpResponse>, AppError> {
    let (m, code) = matching::regenerate_delivery_otp(&state, id, user.id, Utc::now())?;
    Ok(Json(DeliveryOtpResponse {
        match_id: m.id,
        delivery_otp: code,
        expires_at: m.delivery_otp_expires_at,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/matching/matches/{id}/confirm-delivery",
    tag = "matching",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Match id")),
    request_body = ConfirmDeliveryRequest,
    responses(
        (status = 200, description = "Delivery confirmed and escrow settled", body = Match),
        (status = 400, description = "Wrong or expired code", body = ErrorResponse),
        (status = 429, description = "Code burned after repeated failures", body = ErrorResponse),
    )
)]
pub async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmDeliveryRequest>,
) -> Result<Json<Match>, AppError> {
    Ok(Json(matching::confirm_delivery(
        &state,
        id,
        user.id,
        payload.otp.trim(),
        Utc::now(),
    )?))
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Json<MatchingPreferences> {
    let prefs = state
        .preferences
        .get(&user.id)
        .map(|p| p.value().clone())
        .unwrap_or_else(|| MatchingPreferences::defaults_for(user.id));
    Json(prefs)
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<UpdatePreferencesRequest>,
) -> Result<Json<MatchingPreferences>, AppError> {
    let mut errors = FieldErrors::new();
    if let Some(threshold) = payload.auto_accept_threshold {
        errors.check(
            (0.0..=100.0).contains(&threshold),
            "auto_accept_threshold",
            "threshold must be between 0 and 100",
        );
    }
    if let Some(rating) = payload.min_traveler_rating {
        errors.check(
            (0.0..=5.0).contains(&rating),
            "min_traveler_rating",
            "rating must be between 0 and 5",
        );
    }
    if let Some(hours) = payload.response_time_hours {
        errors.check(
            (1..=MAX_RESPONSE_HOURS).contains(&hours),
            "response_time_hours",
            "response time must be between 1 and 168 hours",
        );
    }
    if let (Some(min), Some(max)) = (payload.min_price, payload.max_price) {
        errors.check(min <= max, "min_price", "min price cannot exceed max price");
    }
    if let Some(blacklist) = &payload.blacklisted_users {
        errors.check(
            !blacklist.contains(&user.id),
            "blacklisted_users",
            "you cannot blacklist yourself",
        );
    }
    errors.into_result()?;

    let mut prefs = state
        .preferences
        .entry(user.id)
        .or_insert_with(|| MatchingPreferences::defaults_for(user.id));

    if let Some(v) = payload.auto_accept_threshold {
        prefs.auto_accept_threshold = v;
    }
    if let Some(v) = payload.notify_on_match {
        prefs.notify_on_match = v;
    }
    if let Some(v) = payload.min_traveler_rating {
        prefs.min_traveler_rating = v;
    }
    if let Some(v) = payload.preferred_cities {
        prefs.preferred_cities = v;
    }
    if let Some(v) = payload.blacklisted_users {
        prefs.blacklisted_users = v;
    }
    if let Some(v) = payload.response_time_hours {
        prefs.response_time_hours = v;
    }
    if payload.min_price.is_some() {
        prefs.min_price = payload.min_price;
    }
    if payload.max_price.is_some() {
        prefs.max_price = payload.max_price;
    }
    if let Some(v) = payload.accepts_fragile {
        prefs.accepts_fragile = v;
    }
    if let Some(v) = payload.accepts_urgent {
        prefs.accepts_urgent = v;
    }
    if payload.max_price_per_kg.is_some() {
        prefs.max_price_per_kg = payload.max_price_per_kg;
    }
    if let Some(v) = payload.preferred_package_types {
        prefs.preferred_package_types = v;
    }
    prefs.updated_at = Utc::now();

    Ok(Json(prefs.clone()))
}

async fn stats(State(state): State<Arc<AppState>>, user: AuthUser) -> Json<MatchingStats> {
    Json(analytics::matching_stats(&state, user.id))
}
