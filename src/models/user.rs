use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::i18n::Language;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Sender,
    Traveler,
    Both,
    Admin,
}

impl Role {
    pub fn can_send(self) -> bool {
        matches!(self, Role::Sender | Role::Both | Role::Admin)
    }

    pub fn can_travel(self) -> bool {
        matches!(self, Role::Traveler | Role::Both | Role::Admin)
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Sender => "sender",
            Role::Traveler => "traveler",
            Role::Both => "both",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub role: Role,
    pub is_phone_verified: bool,
    pub is_document_verified: bool,
    pub is_active: bool,
    pub rating: f64,
    pub total_trips: u32,
    pub total_shipments: u32,
    /// Platform commission taken from this user's traveler earnings, in percent.
    pub commission_rate: Decimal,
    pub preferred_language: Language,
    /// Used when a text has no translation in the preferred language.
    pub fallback_language: Language,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerificationSummary {
    pub phone_verified: bool,
    pub document_verified: bool,
    pub fully_verified: bool,
}

impl User {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let trimmed = name.trim();
        if trimmed.is_empty() {
            self.username.clone()
        } else {
            trimmed.to_string()
        }
    }

    pub fn verification(&self) -> VerificationSummary {
        VerificationSummary {
            phone_verified: self.is_phone_verified,
            document_verified: self.is_document_verified,
            fully_verified: self.is_phone_verified && self.is_document_verified,
        }
    }

    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            username: self.username.clone(),
            name: self.full_name(),
            role: self.role,
            rating: self.rating,
            total_trips: self.total_trips,
            total_shipments: self.total_shipments,
            is_phone_verified: self.is_phone_verified,
            is_document_verified: self.is_document_verified,
        }
    }
}

#[cfg(test)]
impl User {
    pub fn fixture(role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "amine".to_string(),
            email: "amine@example.com".to_string(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            phone_number: None,
            role,
            is_phone_verified: false,
            is_document_verified: false,
            is_active: true,
            rating: 0.0,
            total_trips: 0,
            total_shipments: 0,
            commission_rate: Decimal::new(25, 0),
            preferred_language: Language::Fr,
            fallback_language: Language::En,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub rating: f64,
    pub total_trips: u32,
    pub total_shipments: u32,
    pub is_phone_verified: bool,
    pub is_document_verified: bool,
}

/// Phone verification code. Only the salted hash is kept.
#[derive(Debug, Clone)]
pub struct OtpCode {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub phone_number: String,
    pub code_hash: String,
    pub is_used: bool,
    pub failed_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OtpCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && !self.is_expired(now)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Passport,
    NationalId,
    FlightTicket,
    AddressProof,
}

impl DocumentType {
    pub fn proves_identity(self) -> bool {
        matches!(self, DocumentType::Passport | DocumentType::NationalId)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserDocument {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_type: DocumentType,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: usize,
    pub fingerprint: String,
    pub status: DocumentStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User::fixture(role)
    }

    #[test]
    fn role_capabilities() {
        assert!(Role::Sender.can_send());
        assert!(!Role::Sender.can_travel());
        assert!(Role::Traveler.can_travel());
        assert!(Role::Both.can_send() && Role::Both.can_travel());
        assert!(Role::Admin.is_admin());
    }

    #[test]
    fn fully_verified_needs_phone_and_document() {
        let mut u = user(Role::Sender);
        assert!(!u.verification().fully_verified);

        u.is_phone_verified = true;
        assert!(!u.verification().fully_verified);

        u.is_document_verified = true;
        assert!(u.verification().fully_verified);
    }

    #[test]
    fn full_name_falls_back_to_username() {
        let mut u = user(Role::Traveler);
        assert_eq!(u.full_name(), "amine");

        u.first_name = "Amine".to_string();
        u.last_name = "Benali".to_string();
        assert_eq!(u.full_name(), "Amine Benali");
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let mut u = user(Role::Sender);
        u.password_hash = "secret-hash".to_string();
        let json = serde_json::to_value(&u).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
