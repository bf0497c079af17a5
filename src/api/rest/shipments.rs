use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::engine::matching::{self, PendingScope};
use crate::error::{AppError, FieldErrors};
use crate::models::matching::MatchStatus;
use crate::models::shipment::{
    PackageType, Shipment, ShipmentStatus, TrackingEvent, TrackingStatus, Urgency,
};
use crate::services::{tracking, users::is_valid_phone};
use crate::state::AppState;

const MAX_WEIGHT_KG: f64 = 50.0;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shipments", post(create_shipment).get(list_shipments))
        .route("/shipments/track/:tracking_number", get(public_tracking))
        .route("/shipments/:id", get(get_shipment).patch(update_shipment))
        .route("/shipments/:id/publish", post(publish_shipment))
        .route("/shipments/:id/cancel", post(cancel_shipment))
        .route("/shipments/:id/pickup", post(pickup_shipment))
        .route("/shipments/:id/tracking", get(shipment_tracking))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateShipmentRequest {
    pub package_type: PackageType,
    pub description: String,
    pub weight: f64,
    #[serde(default)]
    pub value: Decimal,
    #[serde(default)]
    pub is_fragile: bool,
    pub origin_city: String,
    #[serde(default)]
    pub origin_address: String,
    pub destination_city: String,
    pub destination_country: String,
    #[serde(default)]
    pub destination_address: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub preferred_pickup_date: DateTime<Utc>,
    pub max_delivery_date: DateTime<Utc>,
    #[serde(default = "default_urgency")]
    pub urgency: Urgency,
    #[serde(default)]
    pub special_instructions: String,
    /// Keep the listing as a draft instead of opening it to matching.
    #[serde(default)]
    pub draft: bool,
}

fn default_urgency() -> Urgency {
    Urgency::Medium
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateShipmentRequest {
    pub description: Option<String>,
    pub weight: Option<f64>,
    pub value: Option<Decimal>,
    pub is_fragile: Option<bool>,
    pub urgency: Option<Urgency>,
    pub origin_address: Option<String>,
    pub destination_address: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub preferred_pickup_date: Option<DateTime<Utc>>,
    pub max_delivery_date: Option<DateTime<Utc>>,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ShipmentFilter {
    pub status: Option<ShipmentStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PublicTracking {
    pub tracking_number: String,
    pub status: ShipmentStatus,
    pub origin_city: String,
    pub destination_city: String,
    pub destination_country: String,
    pub events: Vec<TrackingEvent>,
}

fn validate_shipment(shipment: &Shipment, errors: &mut FieldErrors) -> Result<(), AppError> {
    errors.check(
        shipment.weight > 0.0 && shipment.weight <= MAX_WEIGHT_KG,
        "weight",
        "weight must be greater than 0 and at most 50 kg",
    );
    errors.check(
        shipment.value >= Decimal::ZERO,
        "value",
        "declared value cannot be negative",
    );
    errors.check(
        !shipment.description.trim().is_empty(),
        "description",
        "description is required",
    );
    errors.check(
        !shipment.origin_city.trim().is_empty(),
        "origin_city",
        "origin city is required",
    );
    errors.check(
        !shipment.destination_city.trim().is_empty(),
        "destination_city",
        "destination city is required",
    );
    errors.check(
        !shipment.destination_country.trim().is_empty(),
        "destination_country",
        "destination country is required",
    );
    errors.check(
        !shipment.recipient_name.trim().is_empty(),
        "recipient_name",
        "recipient name is required",
    );
    if !is_valid_phone(&shipment.recipient_phone)? {
        errors.add("recipient_phone", "recipient phone must be 9 to 15 digits");
    }
    errors.check(
        shipment.max_delivery_date > shipment.preferred_pickup_date,
        "max_delivery_date",
        "max delivery date must be after the preferred pickup date",
    );
    Ok(())
}

fn load_shipment(state: &AppState, id: Uuid) -> Result<Shipment, AppError> {
    state
        .shipments
        .get(&id)
        .map(|s| s.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))
}

fn matched_traveler(state: &AppState, shipment: &Shipment) -> Option<Uuid> {
    shipment
        .matched_trip_id
        .and_then(|trip_id| state.trips.get(&trip_id).map(|t| t.traveler_id))
}

/// Sender, matched traveler and admins may see a shipment.
fn visible_shipment(state: &AppState, user: &AuthUser, id: Uuid) -> Result<Shipment, AppError> {
    let shipment = load_shipment(state, id)?;
    let allowed = user.is_admin()
        || shipment.sender_id == user.id
        || matched_traveler(state, &shipment) == Some(user.id);
    if !allowed {
        return Err(AppError::NotFound(format!("shipment {id} not found")));
    }
    Ok(shipment)
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments",
    tag = "shipments",
    security(("bearerAuth" = [])),
    request_body = CreateShipmentRequest,
    responses(
        (status = 201, description = "Shipment created", body = Shipment),
        (status = 400, description = "Invalid shipment", body = ErrorResponse),
        (status = 403, description = "Role cannot send", body = ErrorResponse),
    )
)]
pub async fn create_shipment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateShipmentRequest>,
) -> Result<(StatusCode, Json<Shipment>), AppError> {
    if !user.role.can_send() {
        return Err(AppError::Forbidden(
            "your role does not allow sending shipments".to_string(),
        ));
    }

    let now = Utc::now();
    let shipment = Shipment {
        id: Uuid::new_v4(),
        tracking_number: Shipment::generate_tracking_number(),
        sender_id: user.id,
        package_type: payload.package_type,
        description: payload.description.trim().to_string(),
        weight: payload.weight,
        value: payload.value,
        is_fragile: payload.is_fragile,
        origin_city: payload.origin_city.trim().to_string(),
        origin_address: payload.origin_address,
        destination_city: payload.destination_city.trim().to_string(),
        destination_country: payload.destination_country.trim().to_string(),
        destination_address: payload.destination_address,
        recipient_name: payload.recipient_name.trim().to_string(),
        recipient_phone: payload.recipient_phone.trim().to_string(),
        preferred_pickup_date: payload.preferred_pickup_date,
        max_delivery_date: payload.max_delivery_date,
        urgency: payload.urgency,
        status: if payload.draft {
            ShipmentStatus::Draft
        } else {
            ShipmentStatus::Pending
        },
        matched_trip_id: None,
        price: None,
        is_paid: false,
        payment_method: None,
        special_instructions: payload.special_instructions,
        created_at: now,
        updated_at: now,
    };

    let mut errors = FieldErrors::new();
    validate_shipment(&shipment, &mut errors)?;
    errors.into_result()?;

    state.shipments.insert(shipment.id, shipment.clone());
    tracking::record(
        &state,
        shipment.id,
        TrackingStatus::Created,
        "Shipment listed",
        Some(shipment.origin_city.clone()),
        Some(user.id),
        now,
    );

    info!(
        shipment_id = %shipment.id,
        tracking_number = %shipment.tracking_number,
        sender_id = %user.id,
        "shipment created"
    );
    Ok((StatusCode::CREATED, Json(shipment)))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipments",
    tag = "shipments",
    security(("bearerAuth" = [])),
    params(ShipmentFilter),
    responses((status = 200, description = "Own shipments, newest first", body = [Shipment]))
)]
pub async fn list_shipments(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<ShipmentFilter>,
) -> Json<Vec<Shipment>> {
    let mut shipments: Vec<Shipment> = state
        .shipments
        .iter()
        .filter(|s| s.sender_id == user.id)
        .filter(|s| filter.status.is_none_or(|status| s.status == status))
        .map(|s| s.value().clone())
        .collect();
    shipments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(shipments)
}

#[utoipa::path(
    get,
    path = "/api/v1/shipments/{id}",
    tag = "shipments",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Shipment id")),
    responses(
        (status = 200, description = "Shipment", body = Shipment),
        (status = 404, description = "Not found or not visible", body = ErrorResponse),
    )
)]
pub async fn get_shipment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Shipment>, AppError> {
    Ok(Json(visible_shipment(&state, &user, id)?))
}

async fn update_shipment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateShipmentRequest>,
) -> Result<Json<Shipment>, AppError> {
    let now = Utc::now();
    let (shipment, refresh) = {
        let _guard = state.transaction();
        let mut shipment = load_shipment(&state, id)?;
        if shipment.sender_id != user.id {
            return Err(AppError::Forbidden("not your shipment".to_string()));
        }
        if !shipment.is_editable() {
            return Err(AppError::Conflict(
                "shipment can only be edited while draft or pending".to_string(),
            ));
        }

        if let Some(description) = payload.description {
            shipment.description = description.trim().to_string();
        }
        if let Some(weight) = payload.weight {
            shipment.weight = weight;
        }
        if let Some(value) = payload.value {
            shipment.value = value;
        }
        if let Some(is_fragile) = payload.is_fragile {
            shipment.is_fragile = is_fragile;
        }
        if let Some(urgency) = payload.urgency {
            shipment.urgency = urgency;
        }
        if let Some(address) = payload.origin_address {
            shipment.origin_address = address;
        }
        if let Some(address) = payload.destination_address {
            shipment.destination_address = address;
        }
        if let Some(name) = payload.recipient_name {
            shipment.recipient_name = name.trim().to_string();
        }
        if let Some(phone) = payload.recipient_phone {
            shipment.recipient_phone = phone.trim().to_string();
        }
        if let Some(date) = payload.preferred_pickup_date {
            shipment.preferred_pickup_date = date;
        }
        if let Some(date) = payload.max_delivery_date {
            shipment.max_delivery_date = date;
        }
        if let Some(instructions) = payload.special_instructions {
            shipment.special_instructions = instructions;
        }

        let mut errors = FieldErrors::new();
        validate_shipment(&shipment, &mut errors)?;
        errors.into_result()?;

        shipment.updated_at = now;
        state.shipments.insert(shipment.id, shipment.clone());
        let refresh = matching::refresh_pending(&state, PendingScope::Shipment(id), now);
        (shipment, refresh)
    };

    matching::publish_refresh(&state, &refresh, now);
    info!(
        shipment_id = %id,
        matches_repriced = refresh.refreshed.len(),
        matches_cancelled = refresh.cancelled.len(),
        "shipment updated"
    );
    Ok(Json(shipment))
}

async fn publish_shipment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Shipment>, AppError> {
    let _guard = state.transaction();
    let mut shipment = load_shipment(&state, id)?;
    if shipment.sender_id != user.id {
        return Err(AppError::Forbidden("not your shipment".to_string()));
    }
    if shipment.status != ShipmentStatus::Draft {
        return Err(AppError::Conflict("only drafts can be published".to_string()));
    }
    shipment.status = ShipmentStatus::Pending;
    shipment.updated_at = Utc::now();
    state.shipments.insert(shipment.id, shipment.clone());
    Ok(Json(shipment))
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments/{id}/cancel",
    tag = "shipments",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Shipment id")),
    responses(
        (status = 200, description = "Shipment cancelled, matches cancelled and escrow released", body = Shipment),
        (status = 409, description = "Shipment can no longer be cancelled", body = ErrorResponse),
    )
)]
pub async fn cancel_shipment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Shipment>, AppError> {
    Ok(Json(matching::cancel_shipment(&state, &user, id, Utc::now())?))
}

/// The matched traveler takes the package: matched becomes in transit.
async fn pickup_shipment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Shipment>, AppError> {
    let now = Utc::now();
    let shipment = {
        let _guard = state.transaction();
        let mut shipment = load_shipment(&state, id)?;

        let carrier = state
            .matches
            .iter()
            .find(|m| m.shipment_id == id && m.status == MatchStatus::Accepted)
            .map(|m| m.traveler_id);
        if carrier != Some(user.id) {
            return Err(AppError::Forbidden(
                "only the matched traveler can pick up this shipment".to_string(),
            ));
        }
        if shipment.status != ShipmentStatus::Matched {
            return Err(AppError::Conflict(format!(
                "shipment is {:?}, not matched",
                shipment.status
            )));
        }

        shipment.status = ShipmentStatus::InTransit;
        shipment.updated_at = now;
        state.shipments.insert(shipment.id, shipment.clone());
        tracking::record(
            &state,
            shipment.id,
            TrackingStatus::PickedUp,
            "Package handed to the traveler",
            Some(shipment.origin_city.clone()),
            Some(user.id),
            now,
        );
        shipment
    };

    info!(shipment_id = %id, traveler_id = %user.id, "shipment picked up");
    Ok(Json(shipment))
}

async fn shipment_tracking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TrackingEvent>>, AppError> {
    let shipment = visible_shipment(&state, &user, id)?;
    Ok(Json(tracking::history(&state, shipment.id)))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipments/track/{tracking_number}",
    tag = "shipments",
    params(("tracking_number" = String, Path, description = "Public tracking number")),
    responses(
        (status = 200, description = "Public tracking view", body = PublicTracking),
        (status = 404, description = "Unknown tracking number", body = ErrorResponse),
    )
)]
pub async fn public_tracking(
    State(state): State<Arc<AppState>>,
    Path(tracking_number): Path<String>,
) -> Result<Json<PublicTracking>, AppError> {
    let wanted = tracking_number.trim().to_uppercase();
    let shipment = state
        .shipments
        .iter()
        .find(|s| s.tracking_number == wanted)
        .map(|s| s.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("tracking number {wanted} not found")))?;

    Ok(Json(PublicTracking {
        events: tracking::history(&state, shipment.id),
        tracking_number: shipment.tracking_number,
        status: shipment.status,
        origin_city: shipment.origin_city,
        destination_city: shipment.destination_city,
        destination_country: shipment.destination_country,
    }))
}
