//! Supported languages and the static translation catalogue.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Fr,
    Ar,
    En,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Fr, Language::Ar, Language::En];

    pub fn code(self) -> &'static str {
        match self {
            Language::Fr => "fr",
            Language::Ar => "ar",
            Language::En => "en",
        }
    }

    pub fn from_code(code: &str) -> Option<Language> {
        Language::ALL
            .into_iter()
            .find(|language| language.code().eq_ignore_ascii_case(code.trim()))
    }

    pub fn native_name(self) -> &'static str {
        match self {
            Language::Fr => "Français",
            Language::Ar => "العربية",
            Language::En => "English",
        }
    }

    pub fn is_rtl(self) -> bool {
        self == Language::Ar
    }
}

/// One catalogue key with its text per language. An empty text is a
/// missing translation.
pub struct Entry {
    pub key: &'static str,
    pub fr: &'static str,
    pub ar: &'static str,
    pub en: &'static str,
}

impl Entry {
    pub fn text(&self, language: Language) -> Option<&'static str> {
        let text = match language {
            Language::Fr => self.fr,
            Language::Ar => self.ar,
            Language::En => self.en,
        };
        (!text.is_empty()).then_some(text)
    }

    /// Requested language, then the user's fallback, then French.
    pub fn resolve(&self, language: Language, fallback: Language) -> Option<&'static str> {
        self.text(language)
            .or_else(|| self.text(fallback))
            .or_else(|| self.text(Language::default()))
    }
}

pub const CATALOGUE: &[Entry] = &[
    Entry {
        key: "shipment.status.draft",
        fr: "Brouillon",
        ar: "مسودة",
        en: "Draft",
    },
    Entry {
        key: "shipment.status.pending",
        fr: "En attente",
        ar: "قيد الانتظار",
        en: "Pending",
    },
    Entry {
        key: "shipment.status.matched",
        fr: "Associé à un trajet",
        ar: "تمت المطابقة",
        en: "Matched",
    },
    Entry {
        key: "shipment.status.in_transit",
        fr: "En transit",
        ar: "قيد النقل",
        en: "In transit",
    },
    Entry {
        key: "shipment.status.delivered",
        fr: "Livré",
        ar: "تم التسليم",
        en: "Delivered",
    },
    Entry {
        key: "shipment.status.cancelled",
        fr: "Annulé",
        ar: "ملغى",
        en: "Cancelled",
    },
    Entry {
        key: "trip.status.active",
        fr: "Actif",
        ar: "نشط",
        en: "Active",
    },
    Entry {
        key: "trip.status.completed",
        fr: "Terminé",
        ar: "مكتمل",
        en: "Completed",
    },
    Entry {
        key: "trip.status.expired",
        fr: "Expiré",
        ar: "منتهي الصلاحية",
        en: "Expired",
    },
    Entry {
        key: "match.status.pending",
        fr: "En attente de réponse",
        ar: "في انتظار الرد",
        en: "Awaiting response",
    },
    Entry {
        key: "match.status.accepted",
        fr: "Acceptée",
        ar: "مقبول",
        en: "Accepted",
    },
    Entry {
        key: "match.status.rejected",
        fr: "Refusée",
        ar: "مرفوض",
        en: "Rejected",
    },
    Entry {
        key: "package.documents",
        fr: "Documents",
        ar: "وثائق",
        en: "Documents",
    },
    Entry {
        key: "package.electronics",
        fr: "Électronique",
        ar: "إلكترونيات",
        en: "Electronics",
    },
    Entry {
        key: "package.clothing",
        fr: "Vêtements",
        ar: "ملابس",
        en: "Clothing",
    },
    Entry {
        key: "package.food",
        fr: "Alimentation",
        ar: "مواد غذائية",
        en: "Food",
    },
    Entry {
        key: "package.fragile",
        fr: "Fragile",
        ar: "قابل للكسر",
        en: "Fragile",
    },
    Entry {
        key: "wallet.balance",
        fr: "Solde",
        ar: "الرصيد",
        en: "Balance",
    },
    Entry {
        key: "wallet.pending_balance",
        fr: "Montant bloqué",
        ar: "المبلغ المحجوز",
        en: "Held amount",
    },
    Entry {
        key: "action.accept",
        fr: "Accepter",
        ar: "قبول",
        en: "Accept",
    },
    Entry {
        key: "action.reject",
        fr: "Refuser",
        ar: "رفض",
        en: "Reject",
    },
    Entry {
        key: "action.confirm_delivery",
        fr: "Confirmer la livraison",
        ar: "تأكيد التسليم",
        en: "Confirm delivery",
    },
];

pub fn find_entry(key: &str) -> Option<&'static Entry> {
    CATALOGUE.iter().find(|e| e.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_serde() {
        for language in Language::ALL {
            let json = serde_json::to_string(&language).unwrap();
            assert_eq!(json, format!("\"{}\"", language.code()));
        }
        assert!(serde_json::from_str::<Language>("\"de\"").is_err());
        assert_eq!(Language::from_code(" AR "), Some(Language::Ar));
        assert_eq!(Language::from_code("de"), None);
    }

    #[test]
    fn missing_text_falls_back_then_defaults_to_french() {
        let partial = Entry {
            key: "partial",
            fr: "Bonjour",
            ar: "",
            en: "",
        };
        assert_eq!(partial.resolve(Language::Ar, Language::En), Some("Bonjour"));

        let english_only_fallback = Entry {
            key: "partial",
            fr: "Bonjour",
            ar: "",
            en: "Hello",
        };
        assert_eq!(
            english_only_fallback.resolve(Language::Ar, Language::En),
            Some("Hello")
        );
    }

    #[test]
    fn catalogue_is_complete_and_unique() {
        let mut keys: Vec<&str> = CATALOGUE.iter().map(|e| e.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), CATALOGUE.len());

        for entry in CATALOGUE {
            for language in Language::ALL {
                assert!(entry.text(language).is_some(), "{} lacks {language:?}", entry.key);
            }
        }
    }
}
