use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::i18n::Language;
use crate::services::i18n::{
    self, LanguageInfo, LanguagePreferences, TemplatePreview, Translation, Translations,
    UpdateLanguageRequest,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/i18n/languages", get(languages))
        .route("/i18n/translations", get(translations))
        .route("/i18n/translations/:key", get(translation))
        .route("/i18n/templates/:name", get(template))
        .route("/i18n/preferences", get(my_preferences).put(update_preferences))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TranslationQuery {
    /// `fr`, `ar` or `en`. Defaults to `fr`.
    pub lang: Option<String>,
    /// Comma separated keys. Omit for the whole catalogue.
    pub keys: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LanguageQuery {
    pub lang: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/i18n/languages",
    tag = "i18n",
    responses((status = 200, description = "Supported languages", body = [LanguageInfo]))
)]
pub async fn languages() -> Json<Vec<LanguageInfo>> {
    Json(i18n::supported_languages())
}

#[utoipa::path(
    get,
    path = "/api/v1/i18n/translations",
    tag = "i18n",
    params(TranslationQuery),
    responses(
        (status = 200, description = "Translated texts", body = Translations),
        (status = 400, description = "Unsupported language", body = ErrorResponse),
    )
)]
pub async fn translations(
    Query(query): Query<TranslationQuery>,
) -> Result<Json<Translations>, AppError> {
    let language = i18n::parse_language(query.lang.as_deref())?;
    let keys: Vec<String> = query
        .keys
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Json(i18n::translate_keys(&keys, language, Language::En)))
}

async fn translation(
    Path(key): Path<String>,
    Query(query): Query<LanguageQuery>,
) -> Result<Json<Translation>, AppError> {
    let language = i18n::parse_language(query.lang.as_deref())?;
    Ok(Json(i18n::translate(&key, language)?))
}

async fn template(
    _user: AuthUser,
    Path(name): Path<String>,
    Query(query): Query<LanguageQuery>,
) -> Result<Json<TemplatePreview>, AppError> {
    let language = i18n::parse_language(query.lang.as_deref())?;
    Ok(Json(i18n::template_preview(&name, language)?))
}

async fn my_preferences(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<LanguagePreferences>, AppError> {
    Ok(Json(i18n::preferences(&state, user.id)?))
}

#[utoipa::path(
    put,
    path = "/api/v1/i18n/preferences",
    tag = "i18n",
    security(("bearerAuth" = [])),
    request_body = UpdateLanguageRequest,
    responses(
        (status = 200, description = "Updated preferences", body = LanguagePreferences),
        (status = 400, description = "Unsupported language", body = ErrorResponse),
    )
)]
pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<UpdateLanguageRequest>,
) -> Result<Json<LanguagePreferences>, AppError> {
    Ok(Json(i18n::update_preferences(&state, user.id, payload, Utc::now())?))
}
