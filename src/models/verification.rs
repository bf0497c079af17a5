use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Processing,
    Approved,
    Rejected,
    RequiresManualReview,
    Expired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Automatic,
    Manual,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentVerification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub status: VerificationStatus,
    pub method: VerificationMethod,
    pub validation_score: u8,
    pub fraud_score: u8,
    #[schema(value_type = Object)]
    pub extracted_data: serde_json::Value,
    pub notes: Vec<String>,
    pub reviewed_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl DocumentVerification {
    pub fn awaiting_review(&self) -> bool {
        matches!(
            self.status,
            VerificationStatus::Pending | VerificationStatus::RequiresManualReview
        )
    }
}
