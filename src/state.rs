use std::sync::{Mutex, MutexGuard, RwLock};

use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::auth::jwt::JwtManager;
use crate::auth::otp::SendWindow;
use crate::config::Config;
use crate::models::chat::{Conversation, Message};
use crate::models::document::GeneratedDocument;
use crate::models::matching::{Match, MatchEvent, MatchingPreferences, MatchingRule};
use crate::models::notification::Notification;
use crate::models::payment::{Transaction, Wallet};
use crate::models::rating::Rating;
use crate::models::shipment::{Shipment, TrackingEvent};
use crate::models::trip::Trip;
use crate::models::user::{OtpCode, User, UserDocument};
use crate::models::verification::DocumentVerification;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub config: Config,

    pub users: DashMap<Uuid, User>,
    pub otp_codes: DashMap<Uuid, OtpCode>,
    pub otp_sends: DashMap<String, SendWindow>,
    pub user_documents: DashMap<Uuid, UserDocument>,
    pub verifications: DashMap<Uuid, DocumentVerification>,

    pub shipments: DashMap<Uuid, Shipment>,
    pub tracking_events: DashMap<Uuid, TrackingEvent>,
    pub trips: DashMap<Uuid, Trip>,

    pub matches: DashMap<Uuid, Match>,
    pub preferences: DashMap<Uuid, MatchingPreferences>,
    matching_rule: RwLock<MatchingRule>,

    pub wallets: DashMap<Uuid, Wallet>,
    pub transactions: DashMap<Uuid, Transaction>,

    pub conversations: DashMap<Uuid, Conversation>,
    pub messages: DashMap<Uuid, Message>,
    pub notifications: DashMap<Uuid, Notification>,
    pub ratings: DashMap<Uuid, Rating>,
    pub documents: DashMap<Uuid, GeneratedDocument>,

    pub jwt: JwtManager,
    pub metrics: Metrics,
    pub notification_tx: mpsc::Sender<Uuid>,
    pub match_events_tx: broadcast::Sender<MatchEvent>,

    store_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<Uuid>) {
        let (notification_tx, notification_rx) = mpsc::channel(config.notification_queue_size);
        let (match_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        let jwt = JwtManager::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            Duration::minutes(config.jwt_access_ttl_minutes),
            Duration::days(config.jwt_refresh_ttl_days),
        );

        (
            Self {
                config,
                users: DashMap::new(),
                otp_codes: DashMap::new(),
                otp_sends: DashMap::new(),
                user_documents: DashMap::new(),
                verifications: DashMap::new(),
                shipments: DashMap::new(),
                tracking_events: DashMap::new(),
                trips: DashMap::new(),
                matches: DashMap::new(),
                preferences: DashMap::new(),
                matching_rule: RwLock::new(MatchingRule::default()),
                wallets: DashMap::new(),
                transactions: DashMap::new(),
                conversations: DashMap::new(),
                messages: DashMap::new(),
                notifications: DashMap::new(),
                ratings: DashMap::new(),
                documents: DashMap::new(),
                jwt,
                metrics: Metrics::new(),
                notification_tx,
                match_events_tx,
                store_lock: Mutex::new(()),
            },
            notification_rx,
        )
    }

    /// Serializes multi-map writes. Must not be held across an `.await`.
    pub fn transaction(&self) -> MutexGuard<'_, ()> {
        self.store_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn matching_rule(&self) -> MatchingRule {
        match self.matching_rule.read() {
            Ok(rule) => rule.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_matching_rule(&self, rule: MatchingRule) {
        match self.matching_rule.write() {
            Ok(mut current) => *current = rule,
            Err(poisoned) => *poisoned.into_inner() = rule,
        }
    }

    pub fn publish(&self, event: MatchEvent) {
        let _ = self.match_events_tx.send(event);
    }
}
