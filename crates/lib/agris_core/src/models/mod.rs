//! Domain models shared by both services.
//!
//! These are internal domain models; request/response shapes for the HTTP
//! surface live in `agris_api::models`.

pub mod auth;
pub mod catalog;
pub mod page;
pub mod user;
