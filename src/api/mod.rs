pub mod docs;
pub mod rest;
