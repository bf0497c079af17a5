use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::jwt::{TokenPair, TokenType};
use crate::auth::otp::{self, MAX_FAILED_ATTEMPTS};
use crate::auth::password::{hash_password, is_strong_enough, verify_password};
use crate::config::AdminSeed;
use crate::engine::notifier::{notify, template_data};
use crate::error::{AppError, FieldErrors};
use crate::models::i18n::Language;
use crate::models::notification::{Channel, NotificationPriority};
use crate::models::payment::Wallet;
use crate::models::user::{OtpCode, Role, User};
use crate::state::AppState;

const PHONE_PATTERN: &str = r"^\+?1?\d{9,15}$";
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub phone_number: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
    pub preferred_language: Option<String>,
}

fn default_role() -> Role {
    Role::Sender
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username, email or phone number.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub preferred_language: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenPair,
}

fn matches_pattern(pattern: &str, value: &str) -> Result<bool, AppError> {
    let regex = Regex::new(pattern)
        .map_err(|err| AppError::Internal(format!("invalid pattern {pattern}: {err}")))?;
    Ok(regex.is_match(value))
}

pub fn is_valid_phone(phone: &str) -> Result<bool, AppError> {
    matches_pattern(PHONE_PATTERN, phone)
}

fn phone_taken(state: &AppState, phone: &str, except: Option<Uuid>) -> bool {
    state
        .users
        .iter()
        .any(|u| u.phone_number.as_deref() == Some(phone) && Some(u.id) != except)
}

fn validate_registration(state: &AppState, req: &RegisterRequest) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();
    let username = req.username.trim();

    errors.check(
        (3..=150).contains(&username.chars().count()),
        "username",
        "username must be between 3 and 150 characters",
    );
    if state
        .users
        .iter()
        .any(|u| u.username.eq_ignore_ascii_case(username))
    {
        errors.add("username", "username is already taken");
    }

    if !matches_pattern(EMAIL_PATTERN, req.email.trim())? {
        errors.add("email", "enter a valid email address");
    } else if state
        .users
        .iter()
        .any(|u| u.email.eq_ignore_ascii_case(req.email.trim()))
    {
        errors.add("email", "email is already registered");
    }

    errors.check(
        is_strong_enough(&req.password),
        "password",
        "password must be at least 8 characters with a letter and a digit",
    );

    if let Some(phone) = req.phone_number.as_deref() {
        if !is_valid_phone(phone)? {
            errors.add("phone_number", "phone number must be 9 to 15 digits, optionally prefixed by +");
        } else if phone_taken(state, phone, None) {
            errors.add("phone_number", "phone number is already registered");
        }
    }

    errors.check(
        req.role != Role::Admin,
        "role",
        "role must be sender, traveler or both",
    );

    if let Some(language) = req.preferred_language.as_deref() {
        errors.check(
            Language::from_code(language).is_some(),
            "preferred_language",
            "language must be fr, ar or en",
        );
    }

    errors.into_result()
}

fn issue_tokens(state: &AppState, user: &User) -> Result<TokenPair, AppError> {
    state.jwt.issue_pair(user.id, user.role)
}

pub fn register(
    state: &AppState,
    req: RegisterRequest,
    now: DateTime<Utc>,
) -> Result<AuthResponse, AppError> {
    validate_registration(state, &req)?;
    let password_hash = hash_password(&req.password)?;

    let user = User {
        id: Uuid::new_v4(),
        username: req.username.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        password_hash,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        phone_number: req.phone_number,
        role: req.role,
        is_phone_verified: false,
        is_document_verified: false,
        is_active: true,
        rating: 0.0,
        total_trips: 0,
        total_shipments: 0,
        commission_rate: state.config.default_commission_rate,
        preferred_language: req
            .preferred_language
            .as_deref()
            .and_then(Language::from_code)
            .unwrap_or_default(),
        fallback_language: Language::En,
        created_at: now,
        updated_at: now,
    };

    {
        let _guard = state.transaction();
        // validation ran without the lock
        if state
            .users
            .iter()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username) || u.email == user.email)
        {
            return Err(AppError::Conflict("username or email already registered".to_string()));
        }
        state.users.insert(user.id, user.clone());
        state.wallets.insert(user.id, Wallet::new(user.id, now));
    }

    let tokens = issue_tokens(state, &user)?;
    info!(user_id = %user.id, role = user.role.as_str(), "user registered");
    Ok(AuthResponse { user, tokens })
}

pub fn login(state: &AppState, req: LoginRequest) -> Result<AuthResponse, AppError> {
    let identifier = req.identifier.trim();
    let user = state
        .users
        .iter()
        .find(|u| {
            u.username.eq_ignore_ascii_case(identifier)
                || u.email.eq_ignore_ascii_case(identifier)
                || u.phone_number.as_deref() == Some(identifier)
        })
        .map(|u| u.value().clone())
        .ok_or_else(|| AppError::Unauthorized("invalid credentials".to_string()))?;

    if !verify_password(&req.password, &user.password_hash) {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(AppError::Unauthorized("invalid credentials".to_string()));
    }
    if !user.is_active {
        return Err(AppError::Forbidden("account is disabled".to_string()));
    }

    let tokens = issue_tokens(state, &user)?;
    info!(user_id = %user.id, "user logged in");
    Ok(AuthResponse { user, tokens })
}

pub fn refresh(state: &AppState, refresh_token: &str) -> Result<TokenPair, AppError> {
    let claims = state.jwt.validate(refresh_token, TokenType::Refresh)?;
    let user = state
        .users
        .get(&claims.sub)
        .map(|u| u.value().clone())
        .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))?;
    if !user.is_active {
        return Err(AppError::Forbidden("account is disabled".to_string()));
    }
    issue_tokens(state, &user)
}

pub fn update_profile(
    state: &AppState,
    user_id: Uuid,
    req: UpdateProfileRequest,
    now: DateTime<Utc>,
) -> Result<User, AppError> {
    let mut errors = FieldErrors::new();
    if let Some(role) = req.role {
        errors.check(
            role != Role::Admin,
            "role",
            "role must be sender, traveler or both",
        );
    }
    let language = req.preferred_language.as_deref().map(Language::from_code);
    if let Some(parsed) = language {
        errors.check(
            parsed.is_some(),
            "preferred_language",
            "language must be fr, ar or en",
        );
    }
    errors.into_result()?;

    let mut user = state
        .users
        .get_mut(&user_id)
        .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))?;

    if let Some(first_name) = req.first_name {
        user.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = req.last_name {
        user.last_name = last_name.trim().to_string();
    }
    if let Some(Some(language)) = language {
        user.preferred_language = language;
    }
    if let Some(role) = req.role {
        if user.role != Role::Admin {
            user.role = role;
        }
    }
    user.updated_at = now;
    Ok(user.clone())
}

/// Sends a fresh phone verification code. Returns the plaintext code so the
/// handler can echo it when debug echo is enabled.
pub fn send_phone_otp(
    state: &AppState,
    user_id: Uuid,
    phone: &str,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    if !is_valid_phone(phone)? {
        let mut errors = FieldErrors::new();
        errors.add("phone_number", "phone number must be 9 to 15 digits, optionally prefixed by +");
        return Err(AppError::Validation(errors));
    }
    if phone_taken(state, phone, Some(user_id)) {
        return Err(AppError::Conflict(
            "phone number belongs to another account".to_string(),
        ));
    }

    let window = Duration::minutes(state.config.otp_resend_cooldown_minutes);
    let allowed = {
        let mut sends = state.otp_sends.entry(phone.to_string()).or_default();
        if sends.try_record(now, window, state.config.otp_max_attempts) {
            None
        } else {
            Some(sends.retry_after(now, window))
        }
    };
    if let Some(retry_after) = allowed {
        state
            .metrics
            .otp_requests_total
            .with_label_values(&["rate_limited"])
            .inc();
        warn!(user_id = %user_id, "phone code requested too often");
        return Err(AppError::RateLimited(format!(
            "too many codes requested; retry in {} seconds",
            retry_after.num_seconds().max(1)
        )));
    }

    let code = otp::generate_code();
    let record = OtpCode {
        id: Uuid::new_v4(),
        user_id: Some(user_id),
        phone_number: phone.to_string(),
        code_hash: otp::hash_code(&code),
        is_used: false,
        failed_attempts: 0,
        created_at: now,
        expires_at: now + Duration::minutes(state.config.otp_expiry_minutes),
    };

    {
        let _guard = state.transaction();
        state
            .otp_codes
            .retain(|_, c| !(c.phone_number == phone && c.is_expired(now) && !c.is_used));
        for mut live in state.otp_codes.iter_mut() {
            if live.phone_number == phone && !live.is_used {
                live.is_used = true;
            }
        }
        state.otp_codes.insert(record.id, record);
    }

    notify(
        state,
        user_id,
        Channel::Sms,
        "phone_otp",
        template_data([
            ("otp", code.clone()),
            ("minutes", state.config.otp_expiry_minutes.to_string()),
        ]),
        NotificationPriority::High,
    );
    state
        .metrics
        .otp_requests_total
        .with_label_values(&["sent"])
        .inc();
    info!(user_id = %user_id, "phone code sent");
    Ok(code)
}

pub fn verify_phone_otp(
    state: &AppState,
    user_id: Uuid,
    phone: &str,
    code: &str,
    now: DateTime<Utc>,
) -> Result<User, AppError> {
    let _guard = state.transaction();

    let live = state
        .otp_codes
        .iter()
        .filter(|c| c.phone_number == phone && c.user_id == Some(user_id) && c.is_valid(now))
        .max_by_key(|c| c.created_at)
        .map(|c| c.value().clone())
        .ok_or_else(|| AppError::BadRequest("no valid code for this phone number".to_string()))?;

    if !otp::verify_code(code, &live.code_hash) {
        let burned = match state.otp_codes.get_mut(&live.id) {
            Some(mut stored) => {
                stored.failed_attempts += 1;
                if stored.failed_attempts >= MAX_FAILED_ATTEMPTS {
                    stored.is_used = true;
                }
                stored.is_used
            }
            None => false,
        };
        state
            .metrics
            .otp_requests_total
            .with_label_values(&["failed"])
            .inc();
        return Err(if burned {
            AppError::RateLimited("too many wrong codes; request a new one".to_string())
        } else {
            AppError::BadRequest("invalid verification code".to_string())
        });
    }

    if phone_taken(state, phone, Some(user_id)) {
        return Err(AppError::Conflict(
            "phone number belongs to another account".to_string(),
        ));
    }

    if let Some(mut stored) = state.otp_codes.get_mut(&live.id) {
        stored.is_used = true;
    }
    state.otp_sends.remove(phone);

    let user = {
        let mut user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))?;
        user.phone_number = Some(phone.to_string());
        user.is_phone_verified = true;
        user.updated_at = now;
        user.clone()
    };

    state
        .metrics
        .otp_requests_total
        .with_label_values(&["verified"])
        .inc();
    info!(user_id = %user_id, "phone number verified");
    Ok(user)
}

/// Creates the configured administrator if no user has that username yet.
pub fn seed_admin(state: &AppState, seed: &AdminSeed, now: DateTime<Utc>) -> Result<bool, AppError> {
    if state
        .users
        .iter()
        .any(|u| u.username.eq_ignore_ascii_case(&seed.username))
    {
        return Ok(false);
    }

    let admin = User {
        id: Uuid::new_v4(),
        username: seed.username.clone(),
        email: seed.email.to_lowercase(),
        password_hash: hash_password(&seed.password)?,
        first_name: String::new(),
        last_name: String::new(),
        phone_number: None,
        role: Role::Admin,
        is_phone_verified: false,
        is_document_verified: false,
        is_active: true,
        rating: 0.0,
        total_trips: 0,
        total_shipments: 0,
        commission_rate: state.config.default_commission_rate,
        preferred_language: Language::Fr,
        fallback_language: Language::En,
        created_at: now,
        updated_at: now,
    };
    state.wallets.insert(admin.id, Wallet::new(admin.id, now));
    state.users.insert(admin.id, admin);
    info!(username = %seed.username, "admin account seeded");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn state() -> AppState {
        AppState::new(Config::default()).0
    }

    fn request(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: "secret123".to_string(),
            first_name: "Amine".to_string(),
            last_name: "Bensalah".to_string(),
            phone_number: None,
            role: Role::Both,
            preferred_language: None,
        }
    }

    #[test]
    fn register_creates_user_and_wallet() {
        let state = state();
        let response = register(&state, request("amine", "amine@example.com"), Utc::now()).unwrap();

        assert!(state.users.contains_key(&response.user.id));
        assert!(state.wallets.contains_key(&response.user.id));
        assert_eq!(response.tokens.token_type, "Bearer");
    }

    #[test]
    fn register_collects_field_errors() {
        let state = state();
        let mut req = request("ab", "not-an-email");
        req.password = "short".to_string();
        req.phone_number = Some("12".to_string());
        req.role = Role::Admin;

        let Err(AppError::Validation(errors)) = register(&state, req, Utc::now()) else {
            panic!("expected validation errors");
        };
        for field in ["username", "email", "password", "phone_number", "role"] {
            assert!(errors.get(field).is_some(), "missing error for {field}");
        }
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let state = state();
        register(&state, request("amine", "amine@example.com"), Utc::now()).unwrap();
        let err = register(&state, request("Amine", "other@example.com"), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn login_accepts_username_or_email() {
        let state = state();
        register(&state, request("amine", "amine@example.com"), Utc::now()).unwrap();

        for identifier in ["amine", "AMINE@example.com"] {
            let ok = login(
                &state,
                LoginRequest {
                    identifier: identifier.to_string(),
                    password: "secret123".to_string(),
                },
            );
            assert!(ok.is_ok(), "login with {identifier}");
        }

        let bad = login(
            &state,
            LoginRequest {
                identifier: "amine".to_string(),
                password: "wrong-pass1".to_string(),
            },
        );
        assert!(matches!(bad, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn refresh_rejects_access_tokens() {
        let state = state();
        let response = register(&state, request("amine", "amine@example.com"), Utc::now()).unwrap();

        assert!(refresh(&state, &response.tokens.refresh).is_ok());
        assert!(matches!(
            refresh(&state, &response.tokens.access),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn phone_code_send_is_rate_limited() {
        let state = state();
        let user = register(&state, request("amine", "amine@example.com"), Utc::now())
            .unwrap()
            .user;
        let now = Utc::now();

        for _ in 0..3 {
            send_phone_otp(&state, user.id, "+213555123456", now).unwrap();
        }
        let err = send_phone_otp(&state, user.id, "+213555123456", now).unwrap_err();
        assert!(matches!(err, AppError::RateLimited(_)));

        let later = now + Duration::minutes(2);
        assert!(send_phone_otp(&state, user.id, "+213555123456", later).is_ok());
    }

    #[test]
    fn only_the_latest_phone_code_verifies() {
        let state = state();
        let user = register(&state, request("amine", "amine@example.com"), Utc::now())
            .unwrap()
            .user;
        let now = Utc::now();
        let phone = "+213555123456";

        let first = send_phone_otp(&state, user.id, phone, now).unwrap();
        let second = send_phone_otp(&state, user.id, phone, now + Duration::seconds(1)).unwrap();

        if first != second {
            assert!(verify_phone_otp(&state, user.id, phone, &first, now).is_err());
        }
        let verified = verify_phone_otp(&state, user.id, phone, &second, now).unwrap();
        assert!(verified.is_phone_verified);
        assert_eq!(verified.phone_number.as_deref(), Some(phone));
    }

    #[test]
    fn phone_code_burns_after_repeated_failures() {
        let state = state();
        let user = register(&state, request("amine", "amine@example.com"), Utc::now())
            .unwrap()
            .user;
        let now = Utc::now();
        let phone = "+213555123456";
        let code = send_phone_otp(&state, user.id, phone, now).unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..4 {
            assert!(matches!(
                verify_phone_otp(&state, user.id, phone, wrong, now),
                Err(AppError::BadRequest(_))
            ));
        }
        assert!(matches!(
            verify_phone_otp(&state, user.id, phone, wrong, now),
            Err(AppError::RateLimited(_))
        ));
        assert!(verify_phone_otp(&state, user.id, phone, &code, now).is_err());
    }

    #[test]
    fn expired_phone_code_does_not_verify() {
        let state = state();
        let user = register(&state, request("amine", "amine@example.com"), Utc::now())
            .unwrap()
            .user;
        let now = Utc::now();
        let phone = "+213555123456";
        let code = send_phone_otp(&state, user.id, phone, now).unwrap();

        let later = now + Duration::minutes(state.config.otp_expiry_minutes) + Duration::seconds(1);
        assert!(matches!(
            verify_phone_otp(&state, user.id, phone, &code, later),
            Err(AppError::BadRequest(_))
        ));
        assert!(!state.users.get(&user.id).unwrap().is_phone_verified);
    }

    #[test]
    fn registration_rejects_unsupported_language() {
        let state = state();
        let mut req = request("amine", "amine@example.com");
        req.preferred_language = Some("de".to_string());

        let Err(AppError::Validation(errors)) = register(&state, req, Utc::now()) else {
            panic!("expected validation errors");
        };
        assert!(errors.get("preferred_language").is_some());

        let mut req = request("amine", "amine@example.com");
        req.preferred_language = Some("ar".to_string());
        let user = register(&state, req, Utc::now()).unwrap().user;
        assert_eq!(user.preferred_language, Language::Ar);
    }

    #[test]
    fn admin_seed_is_idempotent() {
        let state = state();
        let seed = AdminSeed {
            username: "admin".to_string(),
            email: "admin@kleer.dz".to_string(),
            password: "admin1234".to_string(),
        };
        assert!(seed_admin(&state, &seed, Utc::now()).unwrap());
        assert!(!seed_admin(&state, &seed, Utc::now()).unwrap());
        assert_eq!(state.users.len(), 1);
    }
}
