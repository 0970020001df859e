//! Product listing and lookup.

use agris_core::error::{ServiceError, ServiceResult};
use agris_core::models::catalog::{
    Product, ProductQuery, ProductSort, RelationKind, RelationQuery, SortOrder,
};
use agris_core::models::page::Page;
use uuid::Uuid;

use super::{limit_or, non_empty, normalize_page};
use crate::CatalogState;
use crate::models::catalog::{PageParams, ProductListParams};

pub const DEFAULT_PRODUCT_LIMIT: i64 = 20;
pub const MAX_PRODUCT_LIMIT: i64 = 100;

/// Similar/related listings use a tighter window.
pub const MIN_RELATION_LIMIT: i64 = 5;
pub const MAX_RELATION_LIMIT: i64 = 20;

pub const MAX_RATE: f64 = 5.0;

pub(crate) fn require_product_id(id: Uuid) -> ServiceResult<Uuid> {
    if id.is_nil() {
        return Err(ServiceError::InvalidInput("invalid product id".into()));
    }
    Ok(id)
}

/// Negative prices count as unset.
fn price_bound(v: Option<f64>) -> Option<f64> {
    v.filter(|p| p.is_finite() && *p > 0.0)
}

/// Rates outside `0..=5` count as unset.
fn rate_bound(v: Option<f64>) -> Option<f64> {
    v.filter(|r| r.is_finite() && *r > 0.0 && *r <= MAX_RATE)
}

fn parse_category_ids(raw: Option<&str>) -> ServiceResult<Vec<Uuid>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Uuid>()
                .map_err(|_| ServiceError::InvalidInput("invalid category id".into()))
        })
        .collect()
}

/// Turn raw query parameters into a [`ProductQuery`].
///
/// Bad paging is clamped; a bad sort column, order or bound pair is
/// rejected.
pub fn normalize_product_query(params: &ProductListParams) -> ServiceResult<ProductQuery> {
    let sort_field = non_empty(params.sort.as_deref());
    let sort = match &sort_field {
        Some(s) => ProductSort::parse(s)
            .ok_or_else(|| ServiceError::InvalidInput("invalid sort field".into()))?,
        None => ProductSort::CreatedAt,
    };
    let order = match non_empty(params.order.as_deref()) {
        Some(o) => SortOrder::parse(&o)
            .ok_or_else(|| ServiceError::InvalidInput("invalid sort order".into()))?,
        // Newest first unless a column was asked for.
        None if sort_field.is_none() => SortOrder::Desc,
        None => SortOrder::Asc,
    };

    let min_price = price_bound(params.min_price);
    let max_price = price_bound(params.max_price);
    if let (Some(min), Some(max)) = (min_price, max_price)
        && min > max
    {
        return Err(ServiceError::InvalidInput(
            "min_price cannot be greater than max_price".into(),
        ));
    }

    let min_rate = rate_bound(params.min_rate);
    let max_rate = rate_bound(params.max_rate);
    if let (Some(min), Some(max)) = (min_rate, max_rate)
        && min > max
    {
        return Err(ServiceError::InvalidInput(
            "min_rate cannot be greater than max_rate".into(),
        ));
    }

    Ok(ProductQuery {
        page: normalize_page(params.page),
        limit: limit_or(params.limit, 1, MAX_PRODUCT_LIMIT, DEFAULT_PRODUCT_LIMIT),
        search: non_empty(params.search.as_deref()),
        category_ids: parse_category_ids(params.category_ids.as_deref())?,
        min_price,
        max_price,
        min_rate,
        max_rate,
        sort,
        order,
    })
}

pub fn normalize_relation_query(params: PageParams) -> RelationQuery {
    RelationQuery {
        page: normalize_page(params.page),
        limit: limit_or(
            params.limit,
            MIN_RELATION_LIMIT,
            MAX_RELATION_LIMIT,
            MIN_RELATION_LIMIT,
        ),
    }
}

pub async fn list(
    state: &CatalogState,
    params: &ProductListParams,
) -> ServiceResult<Page<Product, ProductQuery>> {
    let query = normalize_product_query(params)?;
    state.products.list(&query).await
}

pub async fn get(state: &CatalogState, id: Uuid) -> ServiceResult<Product> {
    let id = require_product_id(id)?;
    state.products.get(id).await
}

pub async fn relations(
    state: &CatalogState,
    id: Uuid,
    kind: RelationKind,
    params: PageParams,
) -> ServiceResult<Page<Product, RelationQuery>> {
    let id = require_product_id(id)?;
    state
        .products
        .relations(id, kind, normalize_relation_query(params))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CatalogFixture;

    #[test]
    fn defaults_sort_newest_first() {
        let q = normalize_product_query(&ProductListParams::default()).unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, DEFAULT_PRODUCT_LIMIT);
        assert_eq!(q.sort, ProductSort::CreatedAt);
        assert_eq!(q.order, SortOrder::Desc);
        assert!(q.category_ids.is_empty());
    }

    #[test]
    fn explicit_sort_defaults_ascending() {
        let q = normalize_product_query(&ProductListParams {
            sort: Some("price".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(q.sort, ProductSort::Price);
        assert_eq!(q.order, SortOrder::Asc);

        let q = normalize_product_query(&ProductListParams {
            sort: Some("name".into()),
            order: Some("desc".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(q.order, SortOrder::Desc);
    }

    #[test]
    fn unknown_sort_or_order_is_rejected() {
        let err = normalize_product_query(&ProductListParams {
            sort: Some("stock".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput("invalid sort field".into()));

        let err = normalize_product_query(&ProductListParams {
            order: Some("sideways".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput("invalid sort order".into()));
    }

    #[test]
    fn limit_outside_range_falls_back() {
        for limit in [0, -1, 101] {
            let q = normalize_product_query(&ProductListParams {
                limit: Some(limit),
                ..Default::default()
            })
            .unwrap();
            assert_eq!(q.limit, DEFAULT_PRODUCT_LIMIT);
        }
    }

    #[test]
    fn price_and_rate_bounds() {
        let q = normalize_product_query(&ProductListParams {
            min_price: Some(-10.0),
            max_price: Some(50.0),
            min_rate: Some(7.0),
            max_rate: Some(4.5),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(q.min_price, None);
        assert_eq!(q.max_price, Some(50.0));
        assert_eq!(q.min_rate, None);
        assert_eq!(q.max_rate, Some(4.5));

        let err = normalize_product_query(&ProductListParams {
            min_price: Some(100.0),
            max_price: Some(50.0),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let err = normalize_product_query(&ProductListParams {
            min_rate: Some(4.0),
            max_rate: Some(2.0),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn category_ids_are_comma_separated() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let q = normalize_product_query(&ProductListParams {
            category_ids: Some(format!("{a}, {b},")),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(q.category_ids, vec![a, b]);

        let err = normalize_product_query(&ProductListParams {
            category_ids: Some("not-a-uuid".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput("invalid category id".into()));
    }

    #[test]
    fn relation_limit_window() {
        let q = normalize_relation_query(PageParams {
            page: Some(-1),
            limit: Some(50),
        });
        assert_eq!(q, RelationQuery { page: 1, limit: 5 });
        let q = normalize_relation_query(PageParams {
            page: Some(2),
            limit: Some(20),
        });
        assert_eq!(q, RelationQuery { page: 2, limit: 20 });
    }

    #[tokio::test]
    async fn repeated_list_is_served_from_cache() {
        let fx = CatalogFixture::new();
        let phones = fx.store.add_category("Phones");
        fx.store.add_product("Alpha", 10.0, &phones);
        fx.store.add_product("Beta", 20.0, &phones);

        let params = ProductListParams::default();
        let first = list(&fx.state, &params).await.unwrap();
        let second = list(&fx.state, &params).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total, 2);
        assert_eq!(fx.store.calls("list_products"), 1);
    }

    #[tokio::test]
    async fn page_far_past_the_end_is_empty() {
        let fx = CatalogFixture::new();
        let phones = fx.store.add_category("Phones");
        fx.store.add_product("Alpha", 10.0, &phones);

        let page = list(
            &fx.state,
            &ProductListParams {
                page: Some(i64::MAX),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.data.is_empty());
        assert_eq!(page.filter.page, i64::MAX);
    }

    #[tokio::test]
    async fn nil_id_short_circuits() {
        let fx = CatalogFixture::new();
        let err = get(&fx.state, Uuid::nil()).await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput("invalid product id".into()));
        assert_eq!(fx.store.calls.total(), 0);
    }

    #[tokio::test]
    async fn missing_product_is_not_found() {
        let fx = CatalogFixture::new();
        let err = get(&fx.state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn similar_products_follow_links() {
        let fx = CatalogFixture::new();
        let phones = fx.store.add_category("Phones");
        let a = fx.store.add_product("Alpha", 10.0, &phones);
        let b = fx.store.add_product("Beta", 20.0, &phones);
        let c = fx.store.add_product("Gamma", 30.0, &phones);
        fx.store.link(a.id, b.id, RelationKind::Similar);
        fx.store.link(a.id, c.id, RelationKind::Related);

        let page = relations(&fx.state, a.id, RelationKind::Similar, PageParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].id, b.id);
        assert_eq!(page.filter.limit, MIN_RELATION_LIMIT);
    }
}
