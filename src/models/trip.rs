use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::shipment::{PackageType, Shipment};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Draft,
    Active,
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

impl TripStatus {
    pub fn can_transition_to(self, next: TripStatus) -> bool {
        use TripStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Draft, Cancelled)
                | (Active, Cancelled)
                | (Active, Completed)
                | (Active, InProgress)
                | (InProgress, Completed)
        )
    }

    pub fn is_closed(self) -> bool {
        matches!(
            self,
            TripStatus::Completed | TripStatus::Cancelled | TripStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Trip {
    pub id: Uuid,
    pub traveler_id: Uuid,
    pub origin_city: String,
    pub origin_country: String,
    pub destination_city: String,
    pub destination_country: String,
    pub departure_date: DateTime<Utc>,
    pub arrival_date: DateTime<Utc>,
    pub flexible_dates: bool,
    pub flexibility_days: u32,
    pub max_weight: f64,
    pub remaining_weight: f64,
    pub max_packages: u32,
    pub remaining_packages: u32,
    /// Empty means every package type is accepted.
    pub accepted_package_types: Vec<PackageType>,
    pub min_price_per_kg: Decimal,
    pub accepts_fragile: bool,
    pub status: TripStatus,
    pub is_verified: bool,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn accepts_package_type(&self, package_type: PackageType) -> bool {
        self.accepted_package_types.is_empty() || self.accepted_package_types.contains(&package_type)
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == TripStatus::Active
            && self.remaining_weight > 0.0
            && self.remaining_packages > 0
            && self.departure_date > now
    }

    pub fn weight_carried(&self) -> f64 {
        self.max_weight - self.remaining_weight
    }

    pub fn utilization_rate(&self) -> f64 {
        if self.max_weight > 0.0 {
            (self.weight_carried() / self.max_weight * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// Explains why the shipment cannot be loaded, if it cannot.
    pub fn check_can_carry(&self, shipment: &Shipment, now: DateTime<Utc>) -> Result<(), String> {
        if !self.is_open(now) {
            return Err("trip is not accepting shipments".to_string());
        }
        if shipment.weight > self.remaining_weight {
            return Err(format!(
                "shipment weighs {} kg but only {} kg remain",
                shipment.weight, self.remaining_weight
            ));
        }
        if !self.accepts_package_type(shipment.package_type) {
            return Err("trip does not accept this package type".to_string());
        }
        if shipment.is_fragile && !self.accepts_fragile {
            return Err("trip does not accept fragile packages".to_string());
        }
        Ok(())
    }

    pub fn load(&mut self, weight: f64, now: DateTime<Utc>) {
        self.remaining_weight = (self.remaining_weight - weight).max(0.0);
        self.remaining_packages = self.remaining_packages.saturating_sub(1);
        if self.remaining_packages == 0 || self.remaining_weight <= 0.0 {
            self.status = TripStatus::InProgress;
        }
        self.updated_at = now;
    }

    pub fn unload(&mut self, weight: f64, now: DateTime<Utc>) {
        self.remaining_weight = (self.remaining_weight + weight).min(self.max_weight);
        self.remaining_packages = (self.remaining_packages + 1).min(self.max_packages);
        if self.status == TripStatus::InProgress && self.departure_date > now {
            self.status = TripStatus::Active;
        }
        self.updated_at = now;
    }
}
