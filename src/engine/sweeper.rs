use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::matching::{cancel_pending_for_trip, expire_overdue};
use crate::engine::notifier::{enqueue, notify, template_data};
use crate::models::matching::{MatchEvent, MatchEventKind};
use crate::models::notification::{Channel, NotificationPriority, NotificationStatus};
use crate::models::trip::{Trip, TripStatus};
use crate::state::AppState;

/// Closed trips are kept this long after their last update.
const CLOSED_TRIP_RETENTION_DAYS: i64 = 180;
/// Pending notifications younger than this are still in flight.
const RESEND_GRACE_SECS: i64 = 60;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub otps_purged: usize,
    pub send_windows_pruned: usize,
    pub matches_expired: usize,
    pub trips_expired: usize,
    pub notifications_requeued: usize,
    pub trips_purged: usize,
}

impl SweepReport {
    fn is_empty(&self) -> bool {
        *self == SweepReport::default()
    }
}

pub async fn run_maintenance(state: Arc<AppState>) {
    let period = std::time::Duration::from_secs(state.config.sweep_interval_secs.max(1));
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = period.as_secs(), "maintenance sweeper started");

    loop {
        ticker.tick().await;
        let report = sweep(&state, Utc::now());
        if report.is_empty() {
            debug!("maintenance sweep found nothing to do");
        } else {
            info!(
                otps_purged = report.otps_purged,
                send_windows_pruned = report.send_windows_pruned,
                matches_expired = report.matches_expired,
                trips_expired = report.trips_expired,
                notifications_requeued = report.notifications_requeued,
                trips_purged = report.trips_purged,
                "maintenance sweep finished"
            );
        }
    }
}

pub fn sweep(state: &AppState, now: DateTime<Utc>) -> SweepReport {
    SweepReport {
        otps_purged: purge_stale_otps(state, now),
        send_windows_pruned: prune_send_windows(state, now),
        matches_expired: expire_overdue(state, now),
        trips_expired: expire_departed_trips(state, now),
        notifications_requeued: requeue_pending_notifications(state, now),
        trips_purged: purge_closed_trips(state, now),
    }
}

pub fn purge_stale_otps(state: &AppState, now: DateTime<Utc>) -> usize {
    let before = state.otp_codes.len();
    state.otp_codes.retain(|_, code| code.is_valid(now));
    before - state.otp_codes.len()
}

/// Drops rate-limit windows with no send inside the resend cooldown.
pub fn prune_send_windows(state: &AppState, now: DateTime<Utc>) -> usize {
    let window = Duration::minutes(state.config.otp_resend_cooldown_minutes);
    let before = state.otp_sends.len();
    state.otp_sends.retain(|_, sends| sends.prune(now, window));
    before.saturating_sub(state.otp_sends.len())
}

/// Active or draft trips whose departure date has passed are closed and
/// their pending matches cancelled.
pub fn expire_departed_trips(state: &AppState, now: DateTime<Utc>) -> usize {
    let (expired, cancelled) = {
        let _guard = state.transaction();
        let departed: Vec<Trip> = state
            .trips
            .iter()
            .filter(|t| {
                matches!(t.status, TripStatus::Active | TripStatus::Draft)
                    && t.departure_date < now
            })
            .map(|t| t.value().clone())
            .collect();

        let mut cancelled = Vec::new();
        let expired: Vec<Trip> = departed
            .into_iter()
            .map(|mut trip| {
                trip.status = TripStatus::Expired;
                trip.updated_at = now;
                state.trips.insert(trip.id, trip.clone());
                cancelled.extend(cancel_pending_for_trip(state, trip.id, now));
                trip
            })
            .collect();
        (expired, cancelled)
    };

    for m in &cancelled {
        state.publish(MatchEvent::of(MatchEventKind::Cancelled, m, now));
        state.metrics.record_match("cancelled");
    }
    for trip in &expired {
        notify(
            state,
            trip.traveler_id,
            Channel::InApp,
            "trip_expired",
            template_data([
                (
                    "route",
                    format!("{} → {}", trip.origin_city, trip.destination_city),
                ),
                (
                    "departure_date",
                    trip.departure_date.format("%Y-%m-%d").to_string(),
                ),
            ]),
            NotificationPriority::Low,
        );
    }
    expired.len()
}

pub fn requeue_pending_notifications(state: &AppState, now: DateTime<Utc>) -> usize {
    let grace = Duration::seconds(RESEND_GRACE_SECS);
    let stale: Vec<Uuid> = state
        .notifications
        .iter()
        .filter(|n| n.status == NotificationStatus::Pending && n.created_at + grace <= now)
        .map(|n| n.id)
        .collect();

    for id in &stale {
        enqueue(state, *id);
    }
    stale.len()
}

pub fn purge_closed_trips(state: &AppState, now: DateTime<Utc>) -> usize {
    let cutoff = now - Duration::days(CLOSED_TRIP_RETENTION_DAYS);
    let _guard = state.transaction();
    let before = state.trips.len();
    state
        .trips
        .retain(|_, trip| !(trip.status.is_closed() && trip.updated_at < cutoff));
    before - state.trips.len()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::auth::otp::SendWindow;
    use crate::config::Config;
    use crate::models::user::OtpCode;

    fn trip(status: TripStatus, departure: DateTime<Utc>, updated: DateTime<Utc>) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            traveler_id: Uuid::new_v4(),
            origin_city: "Oran".to_string(),
            origin_country: "Algeria".to_string(),
            destination_city: "Marseille".to_string(),
            destination_country: "France".to_string(),
            departure_date: departure,
            arrival_date: departure + Duration::hours(2),
            flexible_dates: false,
            flexibility_days: 0,
            max_weight: 10.0,
            remaining_weight: 10.0,
            max_packages: 2,
            remaining_packages: 2,
            accepted_package_types: Vec::new(),
            min_price_per_kg: Decimal::new(900, 0),
            accepts_fragile: false,
            status,
            is_verified: false,
            notes: String::new(),
            created_at: updated,
            updated_at: updated,
        }
    }

    #[test]
    fn departed_trips_expire_and_notify_traveler() {
        let (state, _rx) = AppState::new(Config::default());
        let now = Utc::now();
        let gone = trip(TripStatus::Active, now - Duration::days(1), now);
        let upcoming = trip(TripStatus::Active, now + Duration::days(1), now);
        state.trips.insert(gone.id, gone.clone());
        state.trips.insert(upcoming.id, upcoming.clone());

        assert_eq!(expire_departed_trips(&state, now), 1);
        assert_eq!(state.trips.get(&gone.id).unwrap().status, TripStatus::Expired);
        assert_eq!(state.trips.get(&upcoming.id).unwrap().status, TripStatus::Active);
        assert!(state
            .notifications
            .iter()
            .any(|n| n.user_id == gone.traveler_id && n.template.as_deref() == Some("trip_expired")));
    }

    #[test]
    fn old_closed_trips_are_purged() {
        let (state, _rx) = AppState::new(Config::default());
        let now = Utc::now();
        let ancient = now - Duration::days(200);
        let old_closed = trip(TripStatus::Completed, ancient, ancient);
        let old_open = trip(TripStatus::Active, now + Duration::days(3), ancient);
        state.trips.insert(old_closed.id, old_closed.clone());
        state.trips.insert(old_open.id, old_open.clone());

        assert_eq!(purge_closed_trips(&state, now), 1);
        assert!(state.trips.contains_key(&old_open.id));
    }

    #[test]
    fn used_and_expired_otps_are_purged() {
        let (state, _rx) = AppState::new(Config::default());
        let now = Utc::now();
        for (is_used, expires_at) in [
            (false, now + Duration::minutes(5)),
            (true, now + Duration::minutes(5)),
            (false, now - Duration::minutes(1)),
        ] {
            let id = Uuid::new_v4();
            state.otp_codes.insert(
                id,
                OtpCode {
                    id,
                    user_id: None,
                    phone_number: "+213555123456".to_string(),
                    code_hash: String::new(),
                    is_used,
                    failed_attempts: 0,
                    created_at: now,
                    expires_at,
                },
            );
        }

        assert_eq!(purge_stale_otps(&state, now), 2);
        assert_eq!(state.otp_codes.len(), 1);
    }

    #[test]
    fn idle_send_windows_are_pruned() {
        let (state, _rx) = AppState::new(Config::default());
        let now = Utc::now();
        let window = Duration::minutes(state.config.otp_resend_cooldown_minutes);
        let mut recent = SendWindow::default();
        recent.try_record(now, window, 3);
        let mut idle = SendWindow::default();
        idle.try_record(now - window - Duration::seconds(1), window, 3);
        state.otp_sends.insert("+213555000001".to_string(), recent);
        state.otp_sends.insert("+213555000002".to_string(), idle);

        assert_eq!(prune_send_windows(&state, now), 1);
        assert!(state.otp_sends.contains_key("+213555000001"));
    }

    #[tokio::test]
    async fn stale_pending_notifications_are_requeued() {
        let (state, mut rx) = AppState::new(Config::default());
        let id = notify(
            &state,
            Uuid::new_v4(),
            Channel::Email,
            "payment_received",
            template_data([("amount", "500".to_string()), ("reference", "TXN1".to_string())]),
            NotificationPriority::Normal,
        )
        .unwrap();
        assert_eq!(rx.recv().await, Some(id));

        let later = Utc::now() + Duration::minutes(5);
        assert_eq!(requeue_pending_notifications(&state, later), 1);
        assert_eq!(rx.recv().await, Some(id));
    }
}
