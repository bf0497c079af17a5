use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::shipment::{TrackingEvent, TrackingStatus};
use crate::state::AppState;

pub fn record(
    state: &AppState,
    shipment_id: Uuid,
    status: TrackingStatus,
    description: impl Into<String>,
    location: Option<String>,
    created_by: Option<Uuid>,
    now: DateTime<Utc>,
) -> TrackingEvent {
    let event = TrackingEvent {
        id: Uuid::new_v4(),
        shipment_id,
        status,
        description: description.into(),
        location,
        created_by,
        timestamp: now,
    };
    state.tracking_events.insert(event.id, event.clone());
    event
}

/// Events of one shipment, oldest first.
pub fn history(state: &AppState, shipment_id: Uuid) -> Vec<TrackingEvent> {
    let mut events: Vec<TrackingEvent> = state
        .tracking_events
        .iter()
        .filter(|e| e.shipment_id == shipment_id)
        .map(|e| e.value().clone())
        .collect();
    events.sort_by_key(|e| e.timestamp);
    events
}
