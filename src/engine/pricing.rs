use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::models::matching::EconomicBreakdown;
use crate::models::shipment::{PackageType, Shipment, Urgency};
use crate::models::trip::Trip;

fn urgency_multiplier(urgency: Urgency) -> Decimal {
    match urgency {
        Urgency::Low => Decimal::ONE,
        Urgency::Medium => Decimal::new(11, 1),
        Urgency::High => Decimal::new(12, 1),
        Urgency::Urgent => Decimal::new(15, 1),
    }
}

fn fragility_multiplier(is_fragile: bool) -> Decimal {
    if is_fragile {
        Decimal::new(12, 1)
    } else {
        Decimal::ONE
    }
}

/// `weight x price_per_kg x urgency x fragility`, rounded to cents.
pub fn proposed_price(shipment: &Shipment, trip: &Trip, default_price_per_kg: Decimal) -> Decimal {
    let per_kg = if trip.min_price_per_kg > Decimal::ZERO {
        trip.min_price_per_kg
    } else {
        default_price_per_kg
    };
    let weight = Decimal::from_f64(shipment.weight).unwrap_or(Decimal::ZERO);

    (weight
        * per_kg
        * urgency_multiplier(shipment.urgency)
        * fragility_multiplier(shipment.is_fragile))
    .round_dp(2)
}

fn packaging_fee(package_type: PackageType) -> Decimal {
    if matches!(package_type, PackageType::Fragile | PackageType::Electronics) {
        Decimal::new(1000, 0)
    } else {
        Decimal::new(500, 0)
    }
}

fn service_fee(urgency: Urgency) -> Decimal {
    match urgency {
        Urgency::High | Urgency::Urgent => Decimal::new(200, 0),
        Urgency::Low | Urgency::Medium => Decimal::ZERO,
    }
}

pub fn economics(shipment: &Shipment, price: Decimal, commission_rate: Decimal) -> EconomicBreakdown {
    let platform_commission = (price * commission_rate / Decimal::ONE_HUNDRED).round_dp(2);
    let packaging_fee = packaging_fee(shipment.package_type);
    let service_fee = service_fee(shipment.urgency);
    let traveler_earnings =
        (price - platform_commission - packaging_fee - service_fee).max(Decimal::ZERO);

    EconomicBreakdown {
        price,
        commission_rate,
        platform_commission,
        packaging_fee,
        service_fee,
        traveler_earnings,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::models::shipment::ShipmentStatus;
    use crate::models::trip::TripStatus;

    fn shipment(weight: f64, urgency: Urgency, fragile: bool, package_type: PackageType) -> Shipment {
        let now = Utc::now();
        Shipment {
            id: Uuid::new_v4(),
            tracking_number: Shipment::generate_tracking_number(),
            sender_id: Uuid::new_v4(),
            package_type,
            description: String::new(),
            weight,
            value: Decimal::ZERO,
            is_fragile: fragile,
            origin_city: "Alger".to_string(),
            origin_address: String::new(),
            destination_city: "Paris".to_string(),
            destination_country: "France".to_string(),
            destination_address: String::new(),
            recipient_name: "R".to_string(),
            recipient_phone: "+213555000000".to_string(),
            preferred_pickup_date: now,
            max_delivery_date: now + Duration::days(5),
            urgency,
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

    fn trip(price_per_kg: i64) -> Trip {
        let now = Utc::now();
        Trip {
            id: Uuid::new_v4(),
            traveler_id: Uuid::new_v4(),
            origin_city: "Alger".to_string(),
            origin_country: "Algeria".to_string(),
            destination_city: "Paris".to_string(),
            destination_country: "France".to_string(),
            departure_date: now + Duration::days(2),
            arrival_date: now + Duration::days(3),
            flexible_dates: false,
            flexibility_days: 0,
            max_weight: 20.0,
            remaining_weight: 20.0,
            max_packages: 2,
            remaining_packages: 2,
            accepted_package_types: Vec::new(),
            min_price_per_kg: Decimal::new(price_per_kg, 0),
            accepts_fragile: true,
            status: TripStatus::Active,
            is_verified: false,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn price_applies_urgency_and_fragility() {
        let default = Decimal::new(1000, 0);

        let plain = shipment(2.0, Urgency::Low, false, PackageType::Clothing);
        assert_eq!(proposed_price(&plain, &trip(800), default), Decimal::new(1600, 0));

        let urgent_fragile = shipment(2.0, Urgency::Urgent, true, PackageType::Clothing);
        // 2 * 800 * 1.5 * 1.2
        assert_eq!(
            proposed_price(&urgent_fragile, &trip(800), default),
            Decimal::new(2880, 0)
        );
    }

    #[test]
    fn zero_trip_price_falls_back_to_default() {
        let s = shipment(1.5, Urgency::Medium, false, PackageType::Document);
        // 1.5 * 1000 * 1.1
        assert_eq!(
            proposed_price(&s, &trip(0), Decimal::new(1000, 0)),
            Decimal::new(1650, 0)
        );
    }

    #[test]
    fn economics_breakdown() {
        let s = shipment(2.0, Urgency::High, false, PackageType::Electronics);
        let e = economics(&s, Decimal::new(4000, 0), Decimal::new(25, 0));

        assert_eq!(e.platform_commission, Decimal::new(1000, 0));
        assert_eq!(e.packaging_fee, Decimal::new(1000, 0));
        assert_eq!(e.service_fee, Decimal::new(200, 0));
        assert_eq!(e.traveler_earnings, Decimal::new(1800, 0));
    }

    #[test]
    fn earnings_never_go_negative() {
        let s = shipment(0.1, Urgency::Urgent, true, PackageType::Fragile);
        let e = economics(&s, Decimal::new(300, 0), Decimal::new(25, 0));
        assert_eq!(e.traveler_earnings, Decimal::ZERO);
    }
}
