use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::shipment::PackageType;

pub const ALGORITHM_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
}

/// Per-factor sub-scores, each in `[0, 1]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ScoreBreakdown {
    pub geographic: f64,
    pub weight: f64,
    pub package_type: f64,
    pub fragility: f64,
    pub date: f64,
    pub reputation: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct EconomicBreakdown {
    pub price: Decimal,
    pub commission_rate: Decimal,
    pub platform_commission: Decimal,
    pub packaging_fee: Decimal,
    pub service_fee: Decimal,
    pub traveler_earnings: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Match {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub trip_id: Uuid,
    pub sender_id: Uuid,
    pub traveler_id: Uuid,
    pub compatibility_score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub proposed_price: Decimal,
    pub economics: Option<EconomicBreakdown>,
    pub status: MatchStatus,
    pub algorithm_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub accepted_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing, default)]
    pub delivery_otp_hash: Option<String>,
    pub delivery_otp_generated_at: Option<DateTime<Utc>>,
    pub delivery_otp_expires_at: Option<DateTime<Utc>>,
    pub delivery_otp_failed_attempts: u32,
    pub delivery_confirmed: bool,
    pub delivery_confirmed_at: Option<DateTime<Utc>>,
    pub chat_room_id: Option<Uuid>,
    pub chat_activated_at: Option<DateTime<Utc>>,
    pub auto_accepted: bool,
    pub notification_sent: bool,
    pub notification_sent_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.traveler_id == user_id
    }

    pub fn other_party(&self, user_id: Uuid) -> Uuid {
        if self.sender_id == user_id {
            self.traveler_id
        } else {
            self.sender_id
        }
    }

    pub fn can_confirm_delivery(&self) -> bool {
        self.status == MatchStatus::Accepted && !self.delivery_confirmed
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchEventKind {
    Created,
    Refreshed,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
    Delivered,
}

/// Live lifecycle event pushed to websocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchEvent {
    pub kind: MatchEventKind,
    pub match_id: Uuid,
    pub shipment_id: Uuid,
    pub trip_id: Uuid,
    pub sender_id: Uuid,
    pub traveler_id: Uuid,
    pub status: MatchStatus,
    pub compatibility_score: f64,
    pub at: DateTime<Utc>,
}

impl MatchEvent {
    pub fn of(kind: MatchEventKind, m: &Match, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            match_id: m.id,
            shipment_id: m.shipment_id,
            trip_id: m.trip_id,
            sender_id: m.sender_id,
            traveler_id: m.traveler_id,
            status: m.status,
            compatibility_score: m.compatibility_score,
            at,
        }
    }

    pub fn concerns(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.traveler_id == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ScoreWeights {
    pub geographic: f64,
    pub weight: f64,
    pub package_type: f64,
    pub fragility: f64,
    pub date: f64,
    pub reputation: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            geographic: 35.0,
            weight: 20.0,
            package_type: 15.0,
            fragility: 10.0,
            date: 15.0,
            reputation: 5.0,
        }
    }
}

impl ScoreWeights {
    pub fn values(&self) -> [f64; 6] {
        [
            self.geographic,
            self.weight,
            self.package_type,
            self.fragility,
            self.date,
            self.reputation,
        ]
    }

    pub fn is_valid(&self) -> bool {
        let values = self.values();
        values.iter().all(|w| w.is_finite() && *w >= 0.0) && values.iter().sum::<f64>() > 0.0
    }
}

/// The single active rule driving candidate search.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchingRule {
    pub name: String,
    pub min_compatibility_score: f64,
    pub weights: ScoreWeights,
    pub enable_auto_acceptance: bool,
    pub auto_acceptance_threshold: f64,
    pub updated_at: DateTime<Utc>,
}

impl Default for MatchingRule {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            min_compatibility_score: 30.0,
            weights: ScoreWeights::default(),
            enable_auto_acceptance: false,
            auto_acceptance_threshold: 90.0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchingPreferences {
    pub user_id: Uuid,
    pub auto_accept_threshold: f64,
    pub notify_on_match: bool,
    pub min_traveler_rating: f64,
    pub preferred_cities: Vec<String>,
    pub blacklisted_users: Vec<Uuid>,
    pub response_time_hours: u32,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub accepts_fragile: bool,
    pub accepts_urgent: bool,
    pub max_price_per_kg: Option<Decimal>,
    pub preferred_package_types: Vec<PackageType>,
    pub updated_at: DateTime<Utc>,
}

impl MatchingPreferences {
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            auto_accept_threshold: 80.0,
            notify_on_match: true,
            min_traveler_rating: 3.0,
            preferred_cities: Vec::new(),
            blacklisted_users: Vec::new(),
            response_time_hours: 24,
            min_price: None,
            max_price: None,
            accepts_fragile: true,
            accepts_urgent: true,
            max_price_per_kg: None,
            preferred_package_types: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn excludes_traveler(&self, traveler_id: Uuid, traveler_rating: f64) -> bool {
        self.blacklisted_users.contains(&traveler_id) || traveler_rating < self.min_traveler_rating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one_hundred() {
        let weights = ScoreWeights::default();
        assert_eq!(weights.values().iter().sum::<f64>(), 100.0);
        assert!(weights.is_valid());
    }

    #[test]
    fn negative_or_zero_weights_are_invalid() {
        let mut weights = ScoreWeights::default();
        weights.date = -1.0;
        assert!(!weights.is_valid());

        let zero = ScoreWeights {
            geographic: 0.0,
            weight: 0.0,
            package_type: 0.0,
            fragility: 0.0,
            date: 0.0,
            reputation: 0.0,
        };
        assert!(!zero.is_valid());
    }

    #[test]
    fn preferences_exclude_blacklisted_and_low_rated_travelers() {
        let traveler = Uuid::new_v4();
        let mut prefs = MatchingPreferences::defaults_for(Uuid::new_v4());

        assert!(!prefs.excludes_traveler(traveler, 4.0));
        assert!(prefs.excludes_traveler(traveler, 2.5));

        prefs.blacklisted_users.push(traveler);
        assert!(prefs.excludes_traveler(traveler, 5.0));
    }
}
