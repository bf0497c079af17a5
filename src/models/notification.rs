use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::i18n::Language;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Push,
    InApp,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
            Channel::InApp => "in_app",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Read,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel: Channel,
    pub status: NotificationStatus,
    pub subject: String,
    pub message: String,
    pub template: Option<String>,
    pub language: Language,
    pub data: BTreeMap<String, String>,
    pub priority: NotificationPriority,
    pub is_read: bool,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        if !self.is_read {
            self.is_read = true;
            self.read_at = Some(now);
            self.status = NotificationStatus::Read;
        }
    }
}

pub struct Localized {
    pub subject: &'static str,
    pub body: &'static str,
}

pub struct Template {
    pub name: &'static str,
    /// Placeholders carrying one-time codes. They reach the provider but
    /// are never stored with the notification.
    pub secrets: &'static [&'static str],
    pub fr: Localized,
    pub ar: Localized,
    pub en: Localized,
}

/// Stored in place of a secret placeholder value.
pub const SECRET_MASK: &str = "******";

impl Template {
    pub fn localized(&self, language: Language) -> &Localized {
        match language {
            Language::Fr => &self.fr,
            Language::Ar => &self.ar,
            Language::En => &self.en,
        }
    }

    /// Copy of `data` with every secret value masked.
    pub fn masked(&self, data: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        data.iter()
            .map(|(key, value)| {
                let value = if self.secrets.contains(&key.as_str()) {
                    SECRET_MASK.to_string()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Copy of `data` without the secret keys.
    pub fn storable(&self, data: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        data.iter()
            .filter(|(key, _)| !self.secrets.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

pub const TEMPLATES: &[Template] = &[
    Template {
        name: "match_found",
        secrets: &[],
        fr: Localized {
            subject: "Nouvelle correspondance trouvée",
            body: "Une correspondance compatible à {{score}}% a été trouvée pour {{route}}. Prix proposé : {{price}} DZD.",
        },
        ar: Localized {
            subject: "تم العثور على تطابق جديد",
            body: "تم العثور على تطابق بنسبة توافق {{score}}% للمسار {{route}}. السعر المقترح: {{price}} دج.",
        },
        en: Localized {
            subject: "New match found",
            body: "A new match with a {{score}}% compatibility score was found for {{route}}. Proposed price: {{price}} DZD.",
        },
    },
    Template {
        name: "match_accepted",
        secrets: &[],
        fr: Localized {
            subject: "Correspondance acceptée",
            body: "La correspondance pour l'envoi {{tracking_number}} a été acceptée. Prix convenu : {{price}} DZD.",
        },
        ar: Localized {
            subject: "تم قبول التطابق",
            body: "تم قبول التطابق للشحنة {{tracking_number}}. السعر المتفق عليه: {{price}} دج.",
        },
        en: Localized {
            subject: "Match accepted",
            body: "The match for shipment {{tracking_number}} was accepted. Agreed price: {{price}} DZD.",
        },
    },
    Template {
        name: "delivery_otp",
        secrets: &["otp"],
        fr: Localized {
            subject: "Code de livraison",
            body: "Votre code de livraison pour l'envoi {{tracking_number}} est {{otp}}. Communiquez-le au destinataire ; il expire le {{expires_at}}.",
        },
        ar: Localized {
            subject: "رمز التسليم",
            body: "رمز التسليم للشحنة {{tracking_number}} هو {{otp}}. شاركه مع المستلم؛ تنتهي صلاحيته في {{expires_at}}.",
        },
        en: Localized {
            subject: "Delivery code",
            body: "Your delivery code for shipment {{tracking_number}} is {{otp}}. Share it with the recipient; it expires at {{expires_at}}.",
        },
    },
    Template {
        name: "delivery_confirmed",
        secrets: &[],
        fr: Localized {
            subject: "Livraison confirmée",
            body: "L'envoi {{tracking_number}} a été livré le {{delivered_at}}.",
        },
        ar: Localized {
            subject: "تم تأكيد التسليم",
            body: "تم تسليم الشحنة {{tracking_number}} في {{delivered_at}}.",
        },
        en: Localized {
            subject: "Delivery confirmed",
            body: "Shipment {{tracking_number}} was delivered on {{delivered_at}}.",
        },
    },
    Template {
        name: "phone_otp",
        secrets: &["otp"],
        fr: Localized {
            subject: "Code de vérification",
            body: "Votre code de vérification Kleer Logistics est {{otp}}. Il expire dans {{minutes}} minutes.",
        },
        ar: Localized {
            subject: "رمز التحقق",
            body: "رمز التحقق الخاص بك في Kleer Logistics هو {{otp}}. تنتهي صلاحيته خلال {{minutes}} دقائق.",
        },
        en: Localized {
            subject: "Verification code",
            body: "Your Kleer Logistics verification code is {{otp}}. It expires in {{minutes}} minutes.",
        },
    },
    Template {
        name: "trip_expired",
        secrets: &[],
        fr: Localized {
            subject: "Trajet expiré",
            body: "Votre trajet {{route}} est parti le {{departure_date}} et est maintenant clôturé.",
        },
        ar: Localized {
            subject: "انتهت صلاحية الرحلة",
            body: "رحلتك {{route}} انطلقت في {{departure_date}} وأصبحت مغلقة الآن.",
        },
        en: Localized {
            subject: "Trip expired",
            body: "Your trip {{route}} departed on {{departure_date}} and is now closed.",
        },
    },
    Template {
        name: "document_reviewed",
        secrets: &[],
        fr: Localized {
            subject: "Document examiné",
            body: "Votre document {{document_type}} a été examiné : {{status}}.{{reason}}",
        },
        ar: Localized {
            subject: "تمت مراجعة الوثيقة",
            body: "تمت مراجعة وثيقتك {{document_type}}: {{status}}.{{reason}}",
        },
        en: Localized {
            subject: "Document reviewed",
            body: "Your {{document_type}} was {{status}}.{{reason}}",
        },
    },
    Template {
        name: "payment_received",
        secrets: &[],
        fr: Localized {
            subject: "Paiement reçu",
            body: "{{amount}} DZD ont été crédités sur votre portefeuille ({{reference}}).",
        },
        ar: Localized {
            subject: "تم استلام الدفعة",
            body: "تمت إضافة {{amount}} دج إلى محفظتك ({{reference}}).",
        },
        en: Localized {
            subject: "Payment received",
            body: "{{amount}} DZD was credited to your wallet ({{reference}}).",
        },
    },
];

pub fn find_template(name: &str) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.name == name)
}

/// Substitutes `{{key}}` placeholders. Unknown placeholders are left in place.
pub fn render(text: &str, data: &BTreeMap<String, String>) -> String {
    data.iter().fold(text.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_placeholders() {
        let mut data = BTreeMap::new();
        data.insert("otp".to_string(), "123456".to_string());
        data.insert("minutes".to_string(), "10".to_string());

        let template = find_template("phone_otp").unwrap();
        let body = render(template.en.body, &data);

        assert_eq!(
            body,
            "Your Kleer Logistics verification code is 123456. It expires in 10 minutes."
        );
    }

    #[test]
    fn secrets_are_masked_and_not_stored() {
        let mut data = BTreeMap::new();
        data.insert("otp".to_string(), "654321".to_string());
        data.insert("minutes".to_string(), "10".to_string());
        let template = find_template("phone_otp").unwrap();

        let body = render(template.fr.body, &template.masked(&data));
        assert!(!body.contains("654321"));
        assert!(body.contains(SECRET_MASK));

        let stored = template.storable(&data);
        assert!(!stored.contains_key("otp"));
        assert_eq!(stored.get("minutes").map(String::as_str), Some("10"));
    }

    #[test]
    fn every_language_uses_the_same_placeholders() {
        for template in TEMPLATES {
            let placeholders = |text: &str| {
                let mut found: Vec<String> = text
                    .split("{{")
                    .skip(1)
                    .filter_map(|rest| rest.split_once("}}").map(|(name, _)| name.to_string()))
                    .collect();
                found.sort();
                found
            };
            let english = placeholders(template.en.body);
            for language in [Language::Fr, Language::Ar] {
                assert_eq!(
                    placeholders(template.localized(language).body),
                    english,
                    "{} in {language:?}",
                    template.name
                );
            }
        }
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let body = render("hello {{name}}", &BTreeMap::new());
        assert_eq!(body, "hello {{name}}");
    }

    #[test]
    fn every_template_is_findable() {
        for name in [
            "match_found",
            "match_accepted",
            "delivery_otp",
            "delivery_confirmed",
            "phone_otp",
            "trip_expired",
            "document_reviewed",
            "payment_received",
        ] {
            assert!(find_template(name).is_some(), "{name} missing");
        }
    }
}
