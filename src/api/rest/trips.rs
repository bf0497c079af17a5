use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::engine::matching::{
    PendingScope, cancel_pending_for_trip, publish_refresh, refresh_pending,
};
use crate::error::{AppError, FieldErrors};
use crate::geo::city_matches;
use crate::models::matching::{MatchEvent, MatchEventKind};
use crate::models::shipment::PackageType;
use crate::models::trip::{Trip, TripStatus};
use crate::state::AppState;

const MAX_FLEXIBILITY_DAYS: u32 = 30;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips", post(create_trip).get(list_trips))
        .route("/trips/search", get(search_trips))
        .route("/trips/:id", get(get_trip).patch(update_trip))
        .route("/trips/:id/status", post(change_status))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTripRequest {
    pub origin_city: String,
    pub origin_country: String,
    pub destination_city: String,
    pub destination_country: String,
    pub departure_date: DateTime<Utc>,
    pub arrival_date: DateTime<Utc>,
    #[serde(default)]
    pub flexible_dates: bool,
    #[serde(default)]
    pub flexibility_days: u32,
    pub max_weight: f64,
    #[serde(default = "default_max_packages")]
    pub max_packages: u32,
    #[serde(default)]
    pub accepted_package_types: Vec<PackageType>,
    pub min_price_per_kg: Decimal,
    #[serde(default = "default_true")]
    pub accepts_fragile: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub draft: bool,
}

fn default_max_packages() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateTripRequest {
    pub notes: Option<String>,
    pub min_price_per_kg: Option<Decimal>,
    pub accepted_package_types: Option<Vec<PackageType>>,
    pub accepts_fragile: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeStatusRequest {
    pub status: TripStatus,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TripFilter {
    pub status: Option<TripStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TripSearch {
    pub origin: Option<String>,
    pub destination: Option<String>,
    /// Earliest departure.
    pub from: Option<DateTime<Utc>>,
}

fn validate_trip(req: &CreateTripRequest, now: DateTime<Utc>) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();
    for (field, value) in [
        ("origin_city", &req.origin_city),
        ("origin_country", &req.origin_country),
        ("destination_city", &req.destination_city),
        ("destination_country", &req.destination_country),
    ] {
        errors.check(!value.trim().is_empty(), field, "this field is required");
    }
    errors.check(req.max_weight > 0.0, "max_weight", "max weight must be greater than 0");
    errors.check(req.max_packages >= 1, "max_packages", "at least one package is required");
    errors.check(
        req.arrival_date > req.departure_date,
        "arrival_date",
        "arrival must be after departure",
    );
    errors.check(
        req.departure_date > now,
        "departure_date",
        "departure must be in the future",
    );
    errors.check(
        req.flexibility_days <= MAX_FLEXIBILITY_DAYS,
        "flexibility_days",
        "flexibility cannot exceed 30 days",
    );
    errors.check(
        req.min_price_per_kg > Decimal::ZERO,
        "min_price_per_kg",
        "price per kg must be greater than 0",
    );
    errors.into_result()
}

fn load_trip(state: &AppState, id: Uuid) -> Result<Trip, AppError> {
    state
        .trips
        .get(&id)
        .map(|t| t.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("trip {id} not found")))
}

#[utoipa::path(
    post,
    path = "/api/v1/trips",
    tag = "trips",
    security(("bearerAuth" = [])),
    request_body = CreateTripRequest,
    responses(
        (status = 201, description = "Trip created", body = Trip),
        (status = 400, description = "Invalid trip", body = ErrorResponse),
        (status = 403, description = "Role cannot travel", body = ErrorResponse),
    )
)]
pub async fn create_trip(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateTripRequest>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    if !user.role.can_travel() {
        return Err(AppError::Forbidden(
            "your role does not allow publishing trips".to_string(),
        ));
    }
    let now = Utc::now();
    validate_trip(&payload, now)?;

    let trip = Trip {
        id: Uuid::new_v4(),
        traveler_id: user.id,
        origin_city: payload.origin_city.trim().to_string(),
        origin_country: payload.origin_country.trim().to_string(),
        destination_city: payload.destination_city.trim().to_string(),
        destination_country: payload.destination_country.trim().to_string(),
        departure_date: payload.departure_date,
        arrival_date: payload.arrival_date,
        flexible_dates: payload.flexible_dates,
        flexibility_days: if payload.flexible_dates {
            payload.flexibility_days
        } else {
            0
        },
        max_weight: payload.max_weight,
        remaining_weight: payload.max_weight,
        max_packages: payload.max_packages,
        remaining_packages: payload.max_packages,
        accepted_package_types: payload.accepted_package_types,
        min_price_per_kg: payload.min_price_per_kg,
        accepts_fragile: payload.accepts_fragile,
        status: if payload.draft {
            TripStatus::Draft
        } else {
            TripStatus::Active
        },
        is_verified: false,
        notes: payload.notes,
        created_at: now,
        updated_at: now,
    };

    state.trips.insert(trip.id, trip.clone());
    info!(
        trip_id = %trip.id,
        traveler_id = %user.id,
        route = %format!("{} -> {}", trip.origin_city, trip.destination_city),
        "trip created"
    );
    Ok((StatusCode::CREATED, Json(trip)))
}

pub async fn list_trips(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<TripFilter>,
) -> Json<Vec<Trip>> {
    let mut trips: Vec<Trip> = state
        .trips
        .iter()
        .filter(|t| t.traveler_id == user.id)
        .filter(|t| filter.status.is_none_or(|status| t.status == status))
        .map(|t| t.value().clone())
        .collect();
    trips.sort_by(|a, b| b.departure_date.cmp(&a.departure_date));
    Json(trips)
}

#[utoipa::path(
    get,
    path = "/api/v1/trips/search",
    tag = "trips",
    params(TripSearch),
    responses((status = 200, description = "Active trips, soonest departure first", body = [Trip]))
)]
pub async fn search_trips(
    State(state): State<Arc<AppState>>,
    Query(search): Query<TripSearch>,
) -> Json<Vec<Trip>> {
    let earliest = search.from.unwrap_or_else(Utc::now);
    let origin = search.origin.unwrap_or_default();
    let destination = search.destination.unwrap_or_default();

    let mut trips: Vec<Trip> = state
        .trips
        .iter()
        .filter(|t| {
            t.status == TripStatus::Active
                && t.departure_date >= earliest
                && city_matches(&t.origin_city, origin.trim())
                && city_matches(&t.destination_city, destination.trim())
        })
        .map(|t| t.value().clone())
        .collect();
    trips.sort_by_key(|t| t.departure_date);
    Json(trips)
}

pub async fn get_trip(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(load_trip(&state, id)?))
}

async fn update_trip(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTripRequest>,
) -> Result<Json<Trip>, AppError> {
    let mut errors = FieldErrors::new();
    if let Some(price) = payload.min_price_per_kg {
        errors.check(
            price > Decimal::ZERO,
            "min_price_per_kg",
            "price per kg must be greater than 0",
        );
    }
    errors.into_result()?;

    let now = Utc::now();
    let (trip, refresh) = {
        let _guard = state.transaction();
        let mut trip = load_trip(&state, id)?;
        if trip.traveler_id != user.id {
            return Err(AppError::Forbidden("not your trip".to_string()));
        }
        if !matches!(trip.status, TripStatus::Draft | TripStatus::Active) {
            return Err(AppError::Conflict(
                "trip can only be edited while draft or active".to_string(),
            ));
        }

        if let Some(notes) = payload.notes {
            trip.notes = notes;
        }
        if let Some(price) = payload.min_price_per_kg {
            trip.min_price_per_kg = price;
        }
        if let Some(types) = payload.accepted_package_types {
            trip.accepted_package_types = types;
        }
        if let Some(accepts_fragile) = payload.accepts_fragile {
            trip.accepts_fragile = accepts_fragile;
        }
        trip.updated_at = now;
        state.trips.insert(trip.id, trip.clone());
        let refresh = refresh_pending(&state, PendingScope::Trip(id), now);
        (trip, refresh)
    };

    publish_refresh(&state, &refresh, now);
    info!(
        trip_id = %id,
        matches_repriced = refresh.refreshed.len(),
        matches_cancelled = refresh.cancelled.len(),
        "trip updated"
    );
    Ok(Json(trip))
}

#[utoipa::path(
    post,
    path = "/api/v1/trips/{id}/status",
    tag = "trips",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Trip id")),
    request_body = ChangeStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = Trip),
        (status = 409, description = "Transition not allowed", body = ErrorResponse),
    )
)]
pub async fn change_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangeStatusRequest>,
) -> Result<Json<Trip>, AppError> {
    let now = Utc::now();
    let (trip, cancelled) = {
        let _guard = state.transaction();
        let mut trip = load_trip(&state, id)?;
        if trip.traveler_id != user.id && !user.is_admin() {
            return Err(AppError::Forbidden("not your trip".to_string()));
        }
        if !trip.status.can_transition_to(payload.status) {
            return Err(AppError::Conflict(format!(
                "trip cannot move from {:?} to {:?}",
                trip.status, payload.status
            )));
        }

        trip.status = payload.status;
        trip.updated_at = now;
        state.trips.insert(trip.id, trip.clone());

        let cancelled = if trip.status.is_closed() {
            cancel_pending_for_trip(&state, trip.id, now)
        } else {
            Vec::new()
        };
        (trip, cancelled)
    };

    for m in &cancelled {
        state.publish(MatchEvent::of(MatchEventKind::Cancelled, m, now));
        state.metrics.record_match("cancelled");
    }
    info!(trip_id = %id, status = ?trip.status, matches_cancelled = cancelled.len(), "trip status changed");
    Ok(Json(trip))
}
