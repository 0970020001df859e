//! Service layer: validates and normalizes input, then delegates to the
//! repositories in `agris_core`. Callers are passed in explicitly as a
//! [`Principal`](agris_core::models::auth::Principal).

pub mod auth;
pub mod products;
pub mod ratings;
pub mod users;

/// Pages are 1-based; anything below 1 is page 1.
pub(crate) fn normalize_page(page: Option<i64>) -> i64 {
    page.filter(|p| *p >= 1).unwrap_or(1)
}

/// `limit` outside `min..=max` (or absent) becomes `fallback`.
pub(crate) fn limit_or(limit: Option<i64>, min: i64, max: i64, fallback: i64) -> i64 {
    limit.filter(|l| (min..=max).contains(l)).unwrap_or(fallback)
}

/// Trimmed, non-empty text.
pub(crate) fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_floors_at_one() {
        assert_eq!(normalize_page(None), 1);
        assert_eq!(normalize_page(Some(0)), 1);
        assert_eq!(normalize_page(Some(-4)), 1);
        assert_eq!(normalize_page(Some(3)), 3);
    }

    #[test]
    fn limit_out_of_range_falls_back() {
        assert_eq!(limit_or(None, 1, 100, 20), 20);
        assert_eq!(limit_or(Some(0), 1, 100, 20), 20);
        assert_eq!(limit_or(Some(101), 1, 100, 20), 20);
        assert_eq!(limit_or(Some(100), 1, 100, 20), 100);
        assert_eq!(limit_or(Some(4), 5, 20, 5), 5);
        assert_eq!(limit_or(Some(12), 5, 20, 5), 12);
    }

    #[test]
    fn blank_text_is_none() {
        assert_eq!(non_empty(Some("  ")), None);
        assert_eq!(non_empty(Some(" phone ")), Some("phone".into()));
        assert_eq!(non_empty(None), None);
    }
}
