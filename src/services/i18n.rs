use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, FieldErrors};
use crate::models::i18n::{CATALOGUE, Language, find_entry};
use crate::models::notification::find_template;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct LanguageInfo {
    pub code: Language,
    pub name: String,
    pub is_default: bool,
    pub is_rtl: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LanguagePreferences {
    pub preferred_language: Language,
    pub fallback_language: Language,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateLanguageRequest {
    pub preferred_language: Option<String>,
    pub fallback_language: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Translations {
    pub language: Language,
    pub translations: BTreeMap<String, String>,
    /// Requested keys absent from the catalogue.
    pub missing: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Translation {
    pub key: String,
    pub language: Language,
    pub text: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TemplatePreview {
    pub name: String,
    pub language: Language,
    pub subject: String,
    pub body: String,
}

pub fn supported_languages() -> Vec<LanguageInfo> {
    Language::ALL
        .into_iter()
        .map(|language| LanguageInfo {
            code: language,
            name: language.native_name().to_string(),
            is_default: language == Language::default(),
            is_rtl: language.is_rtl(),
        })
        .collect()
}

/// Parses an optional `lang` parameter. Absent means the default language.
pub fn parse_language(code: Option<&str>) -> Result<Language, AppError> {
    let Some(code) = code else {
        return Ok(Language::default());
    };
    Language::from_code(code).ok_or_else(|| {
        let mut errors = FieldErrors::new();
        errors.add("lang", "language must be fr, ar or en");
        AppError::Validation(errors)
    })
}

/// Looks up `keys`, or the whole catalogue when none are given.
pub fn translate_keys(keys: &[String], language: Language, fallback: Language) -> Translations {
    let mut translations = BTreeMap::new();
    let mut missing = Vec::new();

    if keys.is_empty() {
        for entry in CATALOGUE {
            if let Some(text) = entry.resolve(language, fallback) {
                translations.insert(entry.key.to_string(), text.to_string());
            }
        }
    } else {
        for key in keys {
            match find_entry(key).and_then(|entry| entry.resolve(language, fallback)) {
                Some(text) => {
                    translations.insert(key.clone(), text.to_string());
                }
                None => missing.push(key.clone()),
            }
        }
    }

    Translations {
        language,
        translations,
        missing,
    }
}

pub fn translate(key: &str, language: Language) -> Result<Translation, AppError> {
    let text = find_entry(key)
        .and_then(|entry| entry.resolve(language, Language::En))
        .ok_or_else(|| AppError::NotFound(format!("translation key {key} not found")))?;
    Ok(Translation {
        key: key.to_string(),
        language,
        text: text.to_string(),
    })
}

/// Raw subject and body of a notification template, placeholders unfilled.
pub fn template_preview(name: &str, language: Language) -> Result<TemplatePreview, AppError> {
    let template = find_template(name)
        .ok_or_else(|| AppError::NotFound(format!("template {name} not found")))?;
    let content = template.localized(language);
    Ok(TemplatePreview {
        name: template.name.to_string(),
        language,
        subject: content.subject.to_string(),
        body: content.body.to_string(),
    })
}

pub fn preferences(state: &AppState, user_id: Uuid) -> Result<LanguagePreferences, AppError> {
    state
        .users
        .get(&user_id)
        .map(|u| LanguagePreferences {
            preferred_language: u.preferred_language,
            fallback_language: u.fallback_language,
        })
        .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))
}

pub fn update_preferences(
    state: &AppState,
    user_id: Uuid,
    req: UpdateLanguageRequest,
    now: DateTime<Utc>,
) -> Result<LanguagePreferences, AppError> {
    let mut errors = FieldErrors::new();
    let mut parse = |field: &str, code: Option<&str>| {
        code.and_then(|code| {
            let parsed = Language::from_code(code);
            errors.check(parsed.is_some(), field, "language must be fr, ar or en");
            parsed
        })
    };
    let preferred = parse("preferred_language", req.preferred_language.as_deref());
    let fallback = parse("fallback_language", req.fallback_language.as_deref());
    errors.into_result()?;

    let mut user = state
        .users
        .get_mut(&user_id)
        .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))?;
    if let Some(language) = preferred {
        user.preferred_language = language;
    }
    if let Some(language) = fallback {
        user.fallback_language = language;
    }
    user.updated_at = now;

    info!(
        user_id = %user_id,
        preferred = user.preferred_language.code(),
        fallback = user.fallback_language.code(),
        "language preferences updated"
    );
    Ok(LanguagePreferences {
        preferred_language: user.preferred_language,
        fallback_language: user.fallback_language,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::user::{Role, User};

    #[test]
    fn unknown_keys_are_reported_missing() {
        let keys = vec!["action.accept".to_string(), "no.such.key".to_string()];
        let result = translate_keys(&keys, Language::Ar, Language::En);

        assert_eq!(result.translations.get("action.accept").map(String::as_str), Some("قبول"));
        assert_eq!(result.missing, vec!["no.such.key".to_string()]);
    }

    #[test]
    fn empty_key_list_returns_the_catalogue() {
        let result = translate_keys(&[], Language::En, Language::Fr);
        assert_eq!(result.translations.len(), CATALOGUE.len());
        assert!(result.missing.is_empty());
    }

    #[test]
    fn invalid_language_is_a_field_error() {
        assert_eq!(parse_language(None).unwrap(), Language::Fr);
        assert_eq!(parse_language(Some("en")).unwrap(), Language::En);
        let Err(AppError::Validation(errors)) = parse_language(Some("de")) else {
            panic!("expected a validation error");
        };
        assert!(errors.get("lang").is_some());
    }

    #[test]
    fn preferences_update_validates_both_fields() {
        let (state, _rx) = AppState::new(Config::default());
        let user = User::fixture(Role::Sender);
        state.users.insert(user.id, user.clone());

        let err = update_preferences(
            &state,
            user.id,
            UpdateLanguageRequest {
                preferred_language: Some("ar".to_string()),
                fallback_language: Some("xx".to_string()),
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(state.users.get(&user.id).unwrap().preferred_language, Language::Fr);

        let updated = update_preferences(
            &state,
            user.id,
            UpdateLanguageRequest {
                preferred_language: Some("ar".to_string()),
                fallback_language: None,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(updated.preferred_language, Language::Ar);
        assert_eq!(updated.fallback_language, Language::En);
    }

    #[test]
    fn template_preview_is_localized() {
        let preview = template_preview("match_accepted", Language::Fr).unwrap();
        assert_eq!(preview.subject, "Correspondance acceptée");
        assert!(template_preview("nope", Language::Fr).is_err());
    }
}
