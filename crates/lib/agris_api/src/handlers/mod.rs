//! HTTP request handlers. Each one extracts, calls a service and wraps
//! the result; no business rules live here.

pub mod health;
pub mod products;
pub mod ratings;
pub mod rpc;
pub mod users;
