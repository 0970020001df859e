//! # agris_core
//!
//! Core domain logic for Agris: token issuance, the cache gateway,
//! relational stores and the cache-aside repositories built on them.

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod migrate;
pub mod models;
pub mod rpc;
pub mod search;
pub mod users;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
