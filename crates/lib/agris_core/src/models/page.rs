//! Paged result envelope.

use serde::{Deserialize, Serialize};

/// One page of results plus the filter that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T, F> {
    pub total: i64,
    pub data: Vec<T>,
    pub filter: F,
}

impl<T, F> Page<T, F> {
    pub fn empty(filter: F) -> Self {
        Self {
            total: 0,
            data: Vec::new(),
            filter,
        }
    }
}

/// Row offset for a 1-based page number. Saturates, so a page far past
/// the end reads as empty.
pub fn offset(page: i64, limit: i64) -> i64 {
    (page.max(1) - 1).saturating_mul(limit.max(0))
}
