use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    Document,
    Electronics,
    Clothing,
    Food,
    Medicine,
    Fragile,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Draft,
    Pending,
    Matched,
    InTransit,
    Delivered,
    Cancelled,
    Lost,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wallet,
    Card,
    Cash,
    BankTransfer,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Shipment {
    pub id: Uuid,
    pub tracking_number: String,
    pub sender_id: Uuid,
    pub package_type: PackageType,
    pub description: String,
    pub weight: f64,
    pub value: Decimal,
    pub is_fragile: bool,
    pub origin_city: String,
    pub origin_address: String,
    pub destination_city: String,
    pub destination_country: String,
    pub destination_address: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub preferred_pickup_date: DateTime<Utc>,
    pub max_delivery_date: DateTime<Utc>,
    pub urgency: Urgency,
    pub status: ShipmentStatus,
    pub matched_trip_id: Option<Uuid>,
    pub price: Option<Decimal>,
    pub is_paid: bool,
    pub payment_method: Option<PaymentMethod>,
    pub special_instructions: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn generate_tracking_number() -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("KL{}", hex[..8].to_uppercase())
    }

    pub fn can_be_matched(&self) -> bool {
        matches!(self.status, ShipmentStatus::Draft | ShipmentStatus::Pending)
    }

    pub fn is_editable(&self) -> bool {
        self.can_be_matched()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ShipmentStatus::InTransit && now > self.max_delivery_date
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Created,
    Matched,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub status: TrackingStatus,
    pub description: String,
    pub location: Option<String>,
    pub created_by: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_number_has_prefix_and_eight_hex_chars() {
        let number = Shipment::generate_tracking_number();
        assert_eq!(number.len(), 10);
        assert!(number.starts_with("KL"));
        assert!(
            number[2..]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn statuses_serialize_in_snake_case() {
        let json = serde_json::to_string(&ShipmentStatus::InTransit).unwrap();
        assert_eq!(json, "\"in_transit\"");
    }
}
