use std::env;

use rust_decimal::Decimal;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_access_ttl_minutes: i64,
    pub jwt_refresh_ttl_days: i64,
    pub otp_expiry_minutes: i64,
    pub otp_max_attempts: u32,
    pub otp_resend_cooldown_minutes: i64,
    /// Echo phone and delivery codes in API responses. Local testing only.
    pub otp_debug: bool,
    pub match_expiry_hours: i64,
    pub delivery_otp_ttl_hours: i64,
    pub default_price_per_kg: Decimal,
    pub default_commission_rate: Decimal,
    pub notification_queue_size: usize,
    pub event_buffer_size: usize,
    pub sweep_interval_secs: u64,
    pub admin: Option<AdminSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            jwt_secret: "kleer-development-secret-change-me".to_string(),
            jwt_issuer: "kleer-logistics".to_string(),
            jwt_access_ttl_minutes: 60,
            jwt_refresh_ttl_days: 7,
            otp_expiry_minutes: 10,
            otp_max_attempts: 3,
            otp_resend_cooldown_minutes: 1,
            otp_debug: false,
            match_expiry_hours: 24,
            delivery_otp_ttl_hours: 24,
            default_price_per_kg: Decimal::new(1000, 0),
            default_commission_rate: Decimal::new(25, 0),
            notification_queue_size: 1024,
            event_buffer_size: 1024,
            sweep_interval_secs: 300,
            admin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!("invalid LOG_FORMAT: {other}")));
            }
        };

        let admin = match (
            env::var("ADMIN_USERNAME"),
            env::var("ADMIN_EMAIL"),
            env::var("ADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(email), Ok(password)) => Some(AdminSeed {
                username,
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            jwt_access_ttl_minutes: parse_or_default(
                "JWT_ACCESS_TTL_MINUTES",
                defaults.jwt_access_ttl_minutes,
            )?,
            jwt_refresh_ttl_days: parse_or_default(
                "JWT_REFRESH_TTL_DAYS",
                defaults.jwt_refresh_ttl_days,
            )?,
            otp_expiry_minutes: parse_or_default("OTP_EXPIRY_MINUTES", defaults.otp_expiry_minutes)?,
            otp_max_attempts: parse_or_default("OTP_MAX_ATTEMPTS", defaults.otp_max_attempts)?,
            otp_resend_cooldown_minutes: parse_or_default(
                "OTP_RESEND_COOLDOWN_MINUTES",
                defaults.otp_resend_cooldown_minutes,
            )?,
            otp_debug: parse_or_default("OTP_DEBUG", defaults.otp_debug)?,
            match_expiry_hours: parse_or_default("MATCH_EXPIRY_HOURS", defaults.match_expiry_hours)?,
            delivery_otp_ttl_hours: parse_or_default(
                "DELIVERY_OTP_TTL_HOURS",
                defaults.delivery_otp_ttl_hours,
            )?,
            default_price_per_kg: parse_or_default(
                "DEFAULT_PRICE_PER_KG",
                defaults.default_price_per_kg,
            )?,
            default_commission_rate: parse_or_default(
                "DEFAULT_COMMISSION_RATE",
                defaults.default_commission_rate,
            )?,
            notification_queue_size: parse_or_default(
                "NOTIFICATION_QUEUE_SIZE",
                defaults.notification_queue_size,
            )?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            sweep_interval_secs: parse_or_default(
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
            admin,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
