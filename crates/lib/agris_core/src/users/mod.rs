//! User accounts: relational store, cache-aside repository and the
//! refresh-token record.

pub mod refresh;
pub mod repository;
pub mod store;

pub use refresh::RefreshTokenStore;
pub use repository::UserRepository;
pub use store::{PgUserStore, UserStore};
