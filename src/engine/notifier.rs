use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::notification::{
    Channel, Notification, NotificationPriority, NotificationStatus, find_template, render,
};
use crate::state::AppState;

pub fn template_data<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Stores a notification rendered in the recipient's language and queues it
/// for dispatch. Secret placeholders are masked in the stored copy.
pub fn notify(
    state: &AppState,
    user_id: Uuid,
    channel: Channel,
    template: &str,
    data: BTreeMap<String, String>,
    priority: NotificationPriority,
) -> Option<Uuid> {
    let Some(found) = find_template(template) else {
        warn!(template, "unknown notification template");
        return None;
    };

    let language = state
        .users
        .get(&user_id)
        .map(|u| u.preferred_language)
        .unwrap_or_default();
    let content = found.localized(language);
    let masked = found.masked(&data);

    let notification = Notification {
        id: Uuid::new_v4(),
        user_id,
        channel,
        status: NotificationStatus::Pending,
        subject: render(content.subject, &masked),
        message: render(content.body, &masked),
        template: Some(template.to_string()),
        language,
        data: found.storable(&data),
        priority,
        is_read: false,
        attempts: 0,
        created_at: Utc::now(),
        sent_at: None,
        read_at: None,
    };

    let id = notification.id;
    state.notifications.insert(id, notification);
    enqueue(state, id);
    Some(id)
}

/// Hands a notification to the dispatcher. A full queue leaves it pending
/// for the maintenance sweep to retry.
pub fn enqueue(state: &AppState, id: Uuid) {
    match state.notification_tx.try_send(id) {
        Ok(()) => state.metrics.notifications_in_queue.inc(),
        Err(TrySendError::Full(_)) => {
            warn!(notification_id = %id, "notification queue full; left pending");
        }
        Err(TrySendError::Closed(_)) => {
            warn!(notification_id = %id, "notification dispatcher is gone");
        }
    }
}

pub async fn run_notification_dispatcher(state: Arc<AppState>, mut rx: mpsc::Receiver<Uuid>) {
    info!("notification dispatcher started");

    while let Some(id) = rx.recv().await {
        state.metrics.notifications_in_queue.dec();
        deliver(&state, id);
    }

    warn!("notification dispatcher stopped: queue channel closed");
}

/// Simulated provider call. Email, SMS and push are only logged.
pub fn deliver(state: &AppState, id: Uuid) {
    let Some(mut notification) = state.notifications.get_mut(&id) else {
        debug!(notification_id = %id, "notification vanished before dispatch");
        return;
    };
    if notification.status != NotificationStatus::Pending {
        return;
    }

    notification.attempts += 1;
    notification.status = NotificationStatus::Sent;
    notification.sent_at = Some(Utc::now());

    state
        .metrics
        .notifications_sent_total
        .with_label_values(&[notification.channel.as_str()])
        .inc();

    info!(
        notification_id = %id,
        user_id = %notification.user_id,
        channel = notification.channel.as_str(),
        subject = %notification.subject,
        "notification sent"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::i18n::Language;
    use crate::models::user::{Role, User};

    #[tokio::test]
    async fn notify_renders_and_dispatcher_marks_sent() {
        let (state, mut rx) = AppState::new(Config::default());
        let user_id = Uuid::new_v4();

        let id = notify(
            &state,
            user_id,
            Channel::Sms,
            "phone_otp",
            template_data([("otp", "123456".to_string()), ("minutes", "10".to_string())]),
            NotificationPriority::High,
        )
        .unwrap();

        let stored = state.notifications.get(&id).unwrap().clone();
        assert_eq!(stored.status, NotificationStatus::Pending);
        assert!(!stored.message.contains("123456"));
        assert!(!stored.data.contains_key("otp"));

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued, id);
        deliver(&state, queued);

        let sent = state.notifications.get(&id).unwrap().clone();
        assert_eq!(sent.status, NotificationStatus::Sent);
        assert_eq!(sent.attempts, 1);
    }

    #[test]
    fn notification_uses_recipient_language() {
        let (state, _rx) = AppState::new(Config::default());
        let mut user = User::fixture(Role::Sender);
        user.preferred_language = Language::Ar;
        state.users.insert(user.id, user.clone());

        let id = notify(
            &state,
            user.id,
            Channel::InApp,
            "delivery_confirmed",
            template_data([
                ("tracking_number", "KL-2026-000001".to_string()),
                ("delivered_at", "2026-10-19 10:00 UTC".to_string()),
            ]),
            NotificationPriority::Normal,
        )
        .unwrap();

        let stored = state.notifications.get(&id).unwrap().clone();
        assert_eq!(stored.language, Language::Ar);
        assert_eq!(stored.subject, "تم تأكيد التسليم");
        assert!(stored.message.contains("KL-2026-000001"));
    }

    #[test]
    fn unknown_template_is_skipped() {
        let (state, _rx) = AppState::new(Config::default());
        let id = notify(
            &state,
            Uuid::new_v4(),
            Channel::Email,
            "does_not_exist",
            BTreeMap::new(),
            NotificationPriority::Normal,
        );
        assert!(id.is_none());
        assert!(state.notifications.is_empty());
    }
}
