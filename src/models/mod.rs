pub mod chat;
pub mod document;
pub mod i18n;
pub mod matching;
pub mod notification;
pub mod payment;
pub mod rating;
pub mod shipment;
pub mod trip;
pub mod user;
pub mod verification;
