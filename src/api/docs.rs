use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::rest::{
    admin, analytics, chat, documents, i18n, matching, notifications, payments, ratings,
    shipments, trips, users, verification,
};
use crate::auth::jwt::TokenPair;
use crate::error::{ErrorResponse, FieldErrors};
use crate::models::chat::{Conversation, Message, MessageType};
use crate::models::document::{DocumentKind, GeneratedDocument};
use crate::models::i18n::Language;
use crate::models::matching::{
    EconomicBreakdown, Match, MatchEvent, MatchEventKind, MatchStatus, MatchingPreferences,
    MatchingRule, ScoreBreakdown, ScoreWeights,
};
use crate::models::notification::{
    Channel, Notification, NotificationPriority, NotificationStatus,
};
use crate::models::payment::{
    PaymentMethodConfig, PaymentMethodKind, Transaction, TransactionStatus, TransactionType,
    Wallet,
};
use crate::models::rating::Rating;
use crate::models::shipment::{
    PackageType, PaymentMethod, Shipment, ShipmentStatus, TrackingEvent, TrackingStatus, Urgency,
};
use crate::models::trip::{Trip, TripStatus};
use crate::models::user::{
    DocumentStatus, DocumentType, PublicProfile, Role, User, UserDocument, VerificationSummary,
};
use crate::models::verification::{DocumentVerification, VerificationMethod, VerificationStatus};
use crate::services::analytics::{AdminDashboard, MatchingStats, UserDashboard};
use crate::services::chat::{ConversationSummary, PostMessageRequest};
use crate::services::i18n::{
    LanguageInfo, LanguagePreferences, TemplatePreview, Translation, Translations,
    UpdateLanguageRequest,
};
use crate::services::ratings::{CreateRatingRequest, RatingsForUser};
use crate::services::users::{
    AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, UpdateProfileRequest,
};
use crate::services::verification::{
    ReviewDecision, ReviewRequest, ReviewSummary, UploadDocumentRequest, UploadOutcome,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Kleer Logistics API",
        version = "1.0.0",
        description = "Crowd-shipping marketplace pairing package senders with travelers"
    ),
    paths(
        users::register,
        users::login,
        users::refresh,
        users::me,
        users::send_otp,
        users::verify_otp,
        shipments::create_shipment,
        shipments::list_shipments,
        shipments::get_shipment,
        shipments::cancel_shipment,
        shipments::public_tracking,
        trips::create_trip,
        trips::search_trips,
        trips::change_status,
        matching::find_for_shipment,
        matching::find_for_trip,
        matching::accept_match,
        matching::confirm_delivery,
        payments::list_methods,
        payments::wallet,
        payments::deposit,
        payments::withdraw,
        payments::pay_for_shipment,
        chat::list_messages,
        chat::post_message,
        notifications::list_notifications,
        documents::generate,
        verification::upload,
        ratings::create_rating,
        ratings::received,
        i18n::languages,
        i18n::translations,
        i18n::update_preferences,
        analytics::dashboard,
        analytics::admin_dashboard,
        admin::list_users,
        admin::update_rule,
        admin::confirm_deposit,
        admin::review,
    ),
    components(
        schemas(
            ErrorResponse,
            FieldErrors,
            TokenPair,
            Role,
            Language,
            User,
            PublicProfile,
            VerificationSummary,
            DocumentType,
            DocumentStatus,
            UserDocument,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            UpdateProfileRequest,
            AuthResponse,
            users::SendOtpRequest,
            users::OtpSentResponse,
            users::VerifyOtpRequest,
            PackageType,
            Urgency,
            ShipmentStatus,
            PaymentMethod,
            Shipment,
            TrackingStatus,
            TrackingEvent,
            shipments::CreateShipmentRequest,
            shipments::UpdateShipmentRequest,
            shipments::PublicTracking,
            TripStatus,
            Trip,
            trips::CreateTripRequest,
            trips::UpdateTripRequest,
            trips::ChangeStatusRequest,
            MatchStatus,
            ScoreBreakdown,
            EconomicBreakdown,
            Match,
            MatchEventKind,
            MatchEvent,
            ScoreWeights,
            MatchingRule,
            MatchingPreferences,
            MatchingStats,
            matching::FindMatchesResponse,
            matching::AcceptResponse,
            matching::RejectRequest,
            matching::DeliveryOtpResponse,
            matching::ConfirmDeliveryRequest,
            matching::UpdatePreferencesRequest,
            Wallet,
            TransactionType,
            TransactionStatus,
            Transaction,
            PaymentMethodKind,
            PaymentMethodConfig,
            payments::PaymentMethodQuote,
            payments::WalletResponse,
            payments::AmountRequest,
            Conversation,
            MessageType,
            Message,
            ConversationSummary,
            PostMessageRequest,
            chat::UnreadCount,
            Channel,
            NotificationStatus,
            NotificationPriority,
            Notification,
            notifications::NotificationCount,
            DocumentKind,
            GeneratedDocument,
            documents::GenerateDocumentRequest,
            VerificationStatus,
            VerificationMethod,
            DocumentVerification,
            UploadDocumentRequest,
            UploadOutcome,
            ReviewDecision,
            ReviewRequest,
            ReviewSummary,
            Rating,
            CreateRatingRequest,
            RatingsForUser,
            LanguageInfo,
            LanguagePreferences,
            UpdateLanguageRequest,
            Translations,
            Translation,
            TemplatePreview,
            AdminDashboard,
            UserDashboard,
            admin::SetActiveRequest,
            admin::UpdateRuleRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "users", description = "Accounts, tokens and phone verification"),
        (name = "shipments", description = "Package listings and tracking"),
        (name = "trips", description = "Traveler journeys and spare capacity"),
        (name = "matching", description = "Candidate search, acceptance and delivery confirmation"),
        (name = "payments", description = "Wallet, deposits and escrow"),
        (name = "chat", description = "Conversations between matched parties"),
        (name = "notifications", description = "In-app, SMS and email notifications"),
        (name = "documents", description = "Invoices, contracts and receipts"),
        (name = "verification", description = "Identity document uploads"),
        (name = "ratings", description = "Post-delivery ratings"),
        (name = "i18n", description = "Languages, translations and language preferences"),
        (name = "analytics", description = "Dashboards"),
        (name = "admin", description = "Administration"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_secured_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/matching/matches/{id}/accept"));
        assert!(doc.paths.paths.contains_key("/api/v1/users/register"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearerAuth"));
        assert!(components.schemas.contains_key("Match"));
        assert!(doc.paths.paths.contains_key("/api/v1/i18n/preferences"));
        assert!(components.schemas.contains_key("Language"));
    }
}
