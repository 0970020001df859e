//! Product catalog: relational stores, rating statistics and the
//! cache-aside repositories over them.

pub mod repository;
pub mod statistics;
pub mod store;

pub use repository::{ProductRepository, RatingRepository};
pub use statistics::summarize_ratings;
pub use store::{PgCatalogStore, ProductStore, RatingStore, UserRatingPage};
