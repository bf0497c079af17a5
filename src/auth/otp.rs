//! One-time codes for phone verification and delivery confirmation.
//!
//! Codes are never stored in clear. The stored form is
//! `sha256_hex(code + salt):salt` with a 10 character alphanumeric salt.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};

pub const CODE_LENGTH: usize = 6;
pub const SALT_LENGTH: usize = 10;
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

pub fn generate_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{value:06}")
}

fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

fn digest(code: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn hash_code(code: &str) -> String {
    let salt = generate_salt();
    format!("{}:{salt}", digest(code, &salt))
}

pub fn verify_code(code: &str, stored: &str) -> bool {
    let Some((expected, salt)) = stored.split_once(':') else {
        return false;
    };
    if code.len() != CODE_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    digest(code, salt) == expected
}

/// Sliding window of send timestamps for one phone number.
#[derive(Debug, Clone, Default)]
pub struct SendWindow {
    sent_at: Vec<DateTime<Utc>>,
}

impl SendWindow {
    /// Records a send if fewer than `max` happened within `window`.
    pub fn try_record(&mut self, now: DateTime<Utc>, window: Duration, max: u32) -> bool {
        self.sent_at.retain(|at| now - *at < window);
        if self.sent_at.len() >= max as usize {
            return false;
        }
        self.sent_at.push(now);
        true
    }

    /// Forgets sends older than `window`. Returns whether any remain.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) -> bool {
        self.sent_at.retain(|at| now - *at < window);
        !self.sent_at.is_empty()
    }

    pub fn retry_after(&self, now: DateTime<Utc>, window: Duration) -> Duration {
        self.sent_at
            .iter()
            .min()
            .map(|oldest| (*oldest + window - now).max(Duration::zero()))
            .unwrap_or_else(Duration::zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn hash_has_expected_shape() {
        let stored = hash_code("123456");
        assert_eq!(stored.len(), 75);

        let (hash, salt) = stored.split_once(':').unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(salt.len(), SALT_LENGTH);
    }

    #[test]
    fn verify_accepts_only_the_original_code() {
        let stored = hash_code("042917");

        assert!(verify_code("042917", &stored));
        assert!(!verify_code("042918", &stored));
        assert!(!verify_code("42917", &stored));
        assert!(!verify_code("042917", "corrupted"));
    }

    #[test]
    fn same_code_hashes_differently() {
        assert_ne!(hash_code("111111"), hash_code("111111"));
    }

    #[test]
    fn send_window_limits_and_slides() {
        let start = Utc::now();
        let window = Duration::minutes(1);
        let mut sends = SendWindow::default();

        assert!(sends.try_record(start, window, 3));
        assert!(sends.try_record(start, window, 3));
        assert!(sends.try_record(start, window, 3));
        assert!(!sends.try_record(start + Duration::seconds(30), window, 3));
        assert_eq!(
            sends.retry_after(start + Duration::seconds(30), window),
            Duration::seconds(30)
        );

        assert!(sends.try_record(start + Duration::seconds(61), window, 3));
    }

    #[test]
    fn prune_empties_an_idle_window() {
        let start = Utc::now();
        let window = Duration::minutes(1);
        let mut sends = SendWindow::default();
        sends.try_record(start, window, 3);

        assert!(sends.prune(start + Duration::seconds(30), window));
        assert!(!sends.prune(start + Duration::seconds(90), window));
    }
}
