use chrono::{DateTime, Utc};

use crate::geo::route_score;
use crate::models::matching::{ScoreBreakdown, ScoreWeights};
use crate::models::shipment::Shipment;
use crate::models::trip::Trip;

const MAX_SCORE: f64 = 100.0;

pub fn compute_score(
    shipment: &Shipment,
    trip: &Trip,
    traveler_rating: f64,
    weights: &ScoreWeights,
    now: DateTime<Utc>,
) -> (f64, ScoreBreakdown) {
    let breakdown = ScoreBreakdown {
        geographic: route_score(
            &shipment.origin_city,
            &shipment.destination_city,
            &trip.origin_city,
            &trip.destination_city,
        ),
        weight: weight_score(shipment.weight, trip.remaining_weight),
        package_type: if trip.accepts_package_type(shipment.package_type) {
            1.0
        } else {
            0.0
        },
        fragility: if !shipment.is_fragile || trip.accepts_fragile {
            1.0
        } else {
            0.0
        },
        date: date_score(trip.departure_date, now),
        reputation: reputation_score(traveler_rating),
    };

    let score = weighted_score(&breakdown, weights);
    (score, breakdown)
}

/// Weighted sum in percent, capped at 100 and rounded to two decimals.
pub fn weighted_score(breakdown: &ScoreBreakdown, weights: &ScoreWeights) -> f64 {
    let raw = (breakdown.geographic * weights.geographic)
        + (breakdown.weight * weights.weight)
        + (breakdown.package_type * weights.package_type)
        + (breakdown.fragility * weights.fragility)
        + (breakdown.date * weights.date)
        + (breakdown.reputation * weights.reputation);

    round2(raw.clamp(0.0, MAX_SCORE))
}

fn weight_score(weight: f64, remaining: f64) -> f64 {
    if remaining <= 0.0 {
        return 0.0;
    }

    let ratio = weight / remaining;
    if ratio <= 1.0 {
        (1.0 - ratio).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn date_score(departure: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (departure.date_naive() - now.date_naive()).num_days();
    match days {
        d if d < 0 => 0.0,
        0..=7 => 1.0,
        8..=14 => 0.7,
        15..=30 => 0.4,
        _ => 0.1,
    }
}

fn reputation_score(rating: f64) -> f64 {
    (rating / 5.0).clamp(0.0, 1.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::models::shipment::{PackageType, ShipmentStatus, Urgency};
    use crate::models::trip::TripStatus;

    fn trip(origin: &str, destination: &str, remaining: f64, departs_in_days: i64) -> Trip {
        let now = Utc::now();
        Trip {
            id: Uuid::new_v4(),
            traveler_id: Uuid::new_v4(),
            origin_city: origin.to_string(),
            origin_country: "Algeria".to_string(),
            destination_city: destination.to_string(),
            destination_country: "France".to_string(),
            departure_date: now + Duration::days(departs_in_days),
            arrival_date: now + Duration::days(departs_in_days + 1),
            flexible_dates: false,
            flexibility_days: 0,
            max_weight: remaining,
            remaining_weight: remaining,
            max_packages: 3,
            remaining_packages: 3,
            accepted_package_types: Vec::new(),
            min_price_per_kg: Decimal::new(1000, 0),
            accepts_fragile: false,
            status: TripStatus::Active,
            is_verified: false,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn shipment(origin: &str, destination: &str, weight: f64, fragile: bool) -> Shipment {
        let now = Utc::now();
        Shipment {
            id: Uuid::new_v4(),
            tracking_number: Shipment::generate_tracking_number(),
            sender_id: Uuid::new_v4(),
            package_type: PackageType::Clothing,
            description: "clothes".to_string(),
            weight,
            value: Decimal::ZERO,
            is_fragile: fragile,
            origin_city: origin.to_string(),
            origin_address: String::new(),
            destination_city: destination.to_string(),
            destination_country: "France".to_string(),
            destination_address: String::new(),
            recipient_name: "Nadia".to_string(),
            recipient_phone: "+33611111111".to_string(),
            preferred_pickup_date: now,
            max_delivery_date: now + Duration::days(20),
            urgency: Urgency::Medium,
            status: ShipmentStatus::Pending,
            matched_trip_id: None,
            price: None,
            is_paid: false,
            payment_method: None,
            special_instructions: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn perfect_route_soon_and_light_scores_high() {
        let now = Utc::now();
        let (score, breakdown) = compute_score(
            &shipment("Alger", "Paris", 2.0, false),
            &trip("Alger", "Paris", 10.0, 3),
            5.0,
            &ScoreWeights::default(),
            now,
        );

        assert_eq!(breakdown.geographic, 1.0);
        assert!((breakdown.weight - 0.8).abs() < 1e-9);
        assert_eq!(breakdown.date, 1.0);
        // 35 + 16 + 15 + 10 + 15 + 5
        assert_eq!(score, 96.0);
    }

    #[test]
    fn heavier_shipment_is_penalized() {
        let now = Utc::now();
        let t = trip("Alger", "Paris", 10.0, 3);
        let weights = ScoreWeights::default();

        let (light, _) = compute_score(&shipment("Alger", "Paris", 1.0, false), &t, 4.0, &weights, now);
        let (heavy, _) = compute_score(&shipment("Alger", "Paris", 9.0, false), &t, 4.0, &weights, now);

        assert!(light > heavy);
    }

    #[test]
    fn overweight_and_fragile_mismatch_zero_their_factors() {
        let now = Utc::now();
        let (_, breakdown) = compute_score(
            &shipment("Alger", "Paris", 12.0, true),
            &trip("Alger", "Paris", 10.0, 3),
            4.0,
            &ScoreWeights::default(),
            now,
        );

        assert_eq!(breakdown.weight, 0.0);
        assert_eq!(breakdown.fragility, 0.0);
    }

    #[test]
    fn date_bands() {
        let now = Utc::now();
        assert_eq!(date_score(now + Duration::days(7), now), 1.0);
        assert_eq!(date_score(now + Duration::days(10), now), 0.7);
        assert_eq!(date_score(now + Duration::days(30), now), 0.4);
        assert_eq!(date_score(now + Duration::days(45), now), 0.1);
        assert_eq!(date_score(now - Duration::days(1), now), 0.0);
    }

    #[test]
    fn custom_weights_change_the_total() {
        let now = Utc::now();
        let s = shipment("Oran", "Lyon", 1.0, false);
        let t = trip("Alger", "Paris", 10.0, 3);

        let geography_only = ScoreWeights {
            geographic: 100.0,
            weight: 0.0,
            package_type: 0.0,
            fragility: 0.0,
            date: 0.0,
            reputation: 0.0,
        };
        let (score, _) = compute_score(&s, &t, 5.0, &geography_only, now);
        assert_eq!(score, 0.0);
    }
}
