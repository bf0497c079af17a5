use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Receipt,
    Contract,
}

impl DocumentKind {
    pub fn prefix(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "INV",
            DocumentKind::Receipt => "RCP",
            DocumentKind::Contract => "CTR",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "Invoice",
            DocumentKind::Receipt => "Delivery receipt",
            DocumentKind::Contract => "Transport contract",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeneratedDocument {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub number: String,
    pub owner_id: Uuid,
    pub shipment_id: Uuid,
    pub match_id: Uuid,
    #[serde(skip_serializing, default)]
    pub html: String,
    pub created_at: DateTime<Utc>,
}
