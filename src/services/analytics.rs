use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::engine::scoring::round2;
use crate::models::matching::{Match, MatchStatus};
use crate::models::payment::TransactionStatus;
use crate::models::shipment::ShipmentStatus;
use crate::models::trip::TripStatus;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminDashboard {
    pub users_by_role: BTreeMap<String, usize>,
    pub shipments_by_status: BTreeMap<String, usize>,
    pub trips_by_status: BTreeMap<String, usize>,
    pub matches_by_status: BTreeMap<String, usize>,
    pub accepted_revenue: Decimal,
    pub platform_commission: Decimal,
    pub average_compatibility: f64,
    /// Accepted matches as a percentage of matches that got a response.
    pub success_rate: f64,
    pub completed_transaction_volume: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserDashboard {
    pub user_id: Uuid,
    pub shipments_total: usize,
    pub shipments_active: usize,
    pub shipments_delivered: usize,
    pub trips_total: usize,
    pub trips_active: usize,
    pub total_earned: Decimal,
    pub total_spent: Decimal,
    pub wallet_balance: Decimal,
    pub rating: f64,
    pub unread_notifications: usize,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct MatchingStats {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub pending: usize,
    pub expired: usize,
    pub average_score: f64,
    pub success_rate: f64,
    pub total_earnings: Decimal,
    pub total_commission: Decimal,
}

/// serde name of a unit enum variant, e.g. `in_progress`.
fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => "unknown".to_string(),
    }
}

fn count_by<I, T>(values: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = T>,
    T: Serialize,
{
    let mut counts = BTreeMap::new();
    for value in values {
        *counts.entry(label(&value)).or_insert(0) += 1;
    }
    counts
}

fn success_rate(accepted: usize, rejected: usize, expired: usize) -> f64 {
    let responded = accepted + rejected + expired;
    if responded == 0 {
        0.0
    } else {
        round2(accepted as f64 / responded as f64 * 100.0)
    }
}

fn average_score(matches: &[Match]) -> f64 {
    if matches.is_empty() {
        return 0.0;
    }
    round2(matches.iter().map(|m| m.compatibility_score).sum::<f64>() / matches.len() as f64)
}

pub fn admin_dashboard(state: &AppState) -> AdminDashboard {
    let matches: Vec<Match> = state.matches.iter().map(|m| m.value().clone()).collect();
    let accepted: Vec<&Match> = matches
        .iter()
        .filter(|m| m.status == MatchStatus::Accepted)
        .collect();
    let status_count = |status: MatchStatus| matches.iter().filter(|m| m.status == status).count();

    AdminDashboard {
        users_by_role: count_by(state.users.iter().map(|u| u.role)),
        shipments_by_status: count_by(state.shipments.iter().map(|s| s.status)),
        trips_by_status: count_by(state.trips.iter().map(|t| t.status)),
        matches_by_status: count_by(matches.iter().map(|m| m.status)),
        accepted_revenue: accepted.iter().map(|m| m.proposed_price).sum(),
        platform_commission: accepted
            .iter()
            .filter_map(|m| m.economics.as_ref())
            .map(|e| e.platform_commission)
            .sum(),
        average_compatibility: average_score(&matches),
        success_rate: success_rate(
            accepted.len(),
            status_count(MatchStatus::Rejected),
            status_count(MatchStatus::Expired),
        ),
        completed_transaction_volume: state
            .transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Completed)
            .map(|t| t.amount)
            .sum(),
    }
}

pub fn user_dashboard(state: &AppState, user_id: Uuid) -> UserDashboard {
    let shipments: Vec<ShipmentStatus> = state
        .shipments
        .iter()
        .filter(|s| s.sender_id == user_id)
        .map(|s| s.status)
        .collect();
    let trips: Vec<TripStatus> = state
        .trips
        .iter()
        .filter(|t| t.traveler_id == user_id)
        .map(|t| t.status)
        .collect();
    let wallet = state.wallets.get(&user_id).map(|w| w.value().clone());

    UserDashboard {
        user_id,
        shipments_total: shipments.len(),
        shipments_active: shipments
            .iter()
            .filter(|s| {
                matches!(
                    s,
                    ShipmentStatus::Pending | ShipmentStatus::Matched | ShipmentStatus::InTransit
                )
            })
            .count(),
        shipments_delivered: shipments
            .iter()
            .filter(|s| **s == ShipmentStatus::Delivered)
            .count(),
        trips_total: trips.len(),
        trips_active: trips
            .iter()
            .filter(|t| matches!(t, TripStatus::Active | TripStatus::InProgress))
            .count(),
        total_earned: wallet.as_ref().map(|w| w.total_earned).unwrap_or_default(),
        total_spent: wallet.as_ref().map(|w| w.total_spent).unwrap_or_default(),
        wallet_balance: wallet.as_ref().map(|w| w.balance).unwrap_or_default(),
        rating: state.users.get(&user_id).map(|u| u.rating).unwrap_or(0.0),
        unread_notifications: state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count(),
    }
}

/// Statistics over every match the user is a party to.
pub fn matching_stats(state: &AppState, user_id: Uuid) -> MatchingStats {
    let matches: Vec<Match> = state
        .matches
        .iter()
        .filter(|m| m.is_party(user_id))
        .map(|m| m.value().clone())
        .collect();
    if matches.is_empty() {
        return MatchingStats::default();
    }

    let status_count = |status: MatchStatus| matches.iter().filter(|m| m.status == status).count();
    let accepted = status_count(MatchStatus::Accepted);
    let rejected = status_count(MatchStatus::Rejected);
    let expired = status_count(MatchStatus::Expired);

    let settled = matches
        .iter()
        .filter(|m| m.status == MatchStatus::Accepted && m.delivery_confirmed);
    let total_earnings: Decimal = settled
        .clone()
        .filter(|m| m.traveler_id == user_id)
        .filter_map(|m| m.economics.as_ref())
        .map(|e| e.traveler_earnings)
        .sum();
    let total_commission: Decimal = settled
        .filter_map(|m| m.economics.as_ref())
        .map(|e| e.platform_commission)
        .sum();

    MatchingStats {
        total: matches.len(),
        accepted,
        rejected,
        pending: status_count(MatchStatus::Pending),
        expired,
        average_score: average_score(&matches),
        success_rate: success_rate(accepted, rejected, expired),
        total_earnings,
        total_commission,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_use_serde_names() {
        assert_eq!(label(&ShipmentStatus::InTransit), "in_transit");
        assert_eq!(label(&MatchStatus::Accepted), "accepted");
    }

    #[test]
    fn success_rate_ignores_pending() {
        assert_eq!(success_rate(1, 1, 2), 25.0);
        assert_eq!(success_rate(0, 0, 0), 0.0);
    }

    #[test]
    fn empty_store_has_zeroed_dashboards() {
        let (state, _rx) = AppState::new(crate::config::Config::default());
        let dashboard = admin_dashboard(&state);
        assert!(dashboard.users_by_role.is_empty());
        assert_eq!(dashboard.accepted_revenue, Decimal::ZERO);
        assert_eq!(matching_stats(&state, Uuid::new_v4()).total, 0);
    }
}
