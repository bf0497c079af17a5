pub mod analytics;
pub mod chat;
pub mod documents;
pub mod i18n;
pub mod payments;
pub mod ratings;
pub mod tracking;
pub mod users;
pub mod verification;
