//! Rating service.
//!
//! Cheap checks (star range, nil ids, ownership) run before any write.
//! Create and update fetch the rater's name from the user service with
//! the caller's own token, so a rating is only written by a caller the
//! user service still recognizes.

use agris_core::error::{ServiceError, ServiceResult};
use agris_core::models::auth::Principal;
use agris_core::models::catalog::{
    MyRatings, MyRatingsQuery, NewRating, Rating, RatingQuery, RatingSort, RatingStatistics,
};
use agris_core::models::page::Page;
use agris_core::rpc::UserInfo;
use tracing::{info, warn};
use uuid::Uuid;

use super::products::require_product_id;
use super::{limit_or, non_empty, normalize_page};
use crate::CatalogState;
use crate::models::MessageResponse;
use crate::models::catalog::{
    MyRatingsParams, RateRequest, Rater, RatingListParams, RatingResponse,
};

pub const MIN_STARS: i32 = 1;
pub const MAX_STARS: i32 = 5;

pub const DEFAULT_RATING_LIMIT: i64 = 10;
pub const MAX_RATING_LIMIT: i64 = 100;

pub const MIN_MY_RATINGS_LIMIT: i64 = 5;
pub const MAX_MY_RATINGS_LIMIT: i64 = 20;

fn check_stars(stars: i32) -> ServiceResult<i32> {
    if !(MIN_STARS..=MAX_STARS).contains(&stars) {
        return Err(ServiceError::InvalidInput(format!(
            "stars must be between {MIN_STARS} and {MAX_STARS}"
        )));
    }
    Ok(stars)
}

fn require_rating_id(id: Uuid) -> ServiceResult<Uuid> {
    if id.is_nil() {
        return Err(ServiceError::InvalidInput("invalid rating id".into()));
    }
    Ok(id)
}

async fn rater(state: &CatalogState, principal: &Principal) -> ServiceResult<UserInfo> {
    state
        .authenticator
        .current_user_info(principal)
        .await
        .map_err(|e| {
            warn!(user_id = %principal.user_id, error = %e, "could not load rater profile");
            ServiceError::unauthenticated()
        })
}

/// The caller's own live rating, or `Forbidden` if it belongs to someone else.
async fn owned_rating(
    state: &CatalogState,
    principal: &Principal,
    rating_id: Uuid,
) -> ServiceResult<Rating> {
    let rating = state.ratings.find(require_rating_id(rating_id)?).await?;
    if rating.user_id != principal.user_id {
        return Err(ServiceError::Forbidden(
            "you can only modify your own ratings".into(),
        ));
    }
    Ok(rating)
}

pub async fn rate_product(
    state: &CatalogState,
    principal: &Principal,
    product_id: Uuid,
    req: RateRequest,
) -> ServiceResult<RatingResponse> {
    let stars = check_stars(req.stars)?;
    let product_id = require_product_id(product_id)?;

    state.products.get(product_id).await?;
    if state
        .ratings
        .find_for_user_and_product(principal.user_id, product_id)
        .await?
        .is_some()
    {
        return Err(ServiceError::Conflict(
            "you have already rated this product".into(),
        ));
    }
    let user = rater(state, principal).await?;

    let change = state
        .ratings
        .create(NewRating {
            product_id,
            user_id: principal.user_id,
            stars,
            comment: non_empty(req.comment.as_deref()),
        })
        .await?;
    info!(rating_id = %change.rating.id, %product_id, user_id = %principal.user_id, stars, "product rated");
    Ok(RatingResponse::new(
        change,
        Rater {
            id: user.id,
            name: user.name,
        },
    ))
}

pub async fn update_rating(
    state: &CatalogState,
    principal: &Principal,
    rating_id: Uuid,
    req: RateRequest,
) -> ServiceResult<RatingResponse> {
    let stars = check_stars(req.stars)?;
    let rating = owned_rating(state, principal, rating_id).await?;
    let user = rater(state, principal).await?;

    let change = state
        .ratings
        .update(rating.id, stars, non_empty(req.comment.as_deref()))
        .await?;
    info!(rating_id = %rating.id, user_id = %principal.user_id, stars, "rating updated");
    Ok(RatingResponse::new(
        change,
        Rater {
            id: user.id,
            name: user.name,
        },
    ))
}

pub async fn delete_rating(
    state: &CatalogState,
    principal: &Principal,
    rating_id: Uuid,
) -> ServiceResult<MessageResponse> {
    let rating = owned_rating(state, principal, rating_id).await?;
    state.ratings.delete(rating.id).await?;
    info!(rating_id = %rating.id, user_id = %principal.user_id, "rating deleted");
    Ok(MessageResponse::new("rating deleted"))
}

pub fn normalize_rating_query(product_id: Uuid, params: &RatingListParams) -> RatingQuery {
    let limit = match params.limit {
        Some(l) if l >= 1 => l.min(MAX_RATING_LIMIT),
        _ => DEFAULT_RATING_LIMIT,
    };
    RatingQuery {
        product_id,
        page: normalize_page(params.page),
        limit,
        stars: params
            .stars
            .filter(|s| (MIN_STARS..=MAX_STARS).contains(s)),
        sort: RatingSort::parse_or_default(params.sort.as_deref()),
    }
}

pub async fn list_for_product(
    state: &CatalogState,
    product_id: Uuid,
    params: &RatingListParams,
) -> ServiceResult<Page<Rating, RatingQuery>> {
    let product_id = require_product_id(product_id)?;
    state
        .ratings
        .list_for_product(&normalize_rating_query(product_id, params))
        .await
}

pub async fn statistics(state: &CatalogState, product_id: Uuid) -> ServiceResult<RatingStatistics> {
    let product_id = require_product_id(product_id)?;
    state.ratings.statistics(product_id).await
}

pub fn normalize_my_ratings_query(params: &MyRatingsParams) -> MyRatingsQuery {
    MyRatingsQuery {
        page: normalize_page(params.page),
        limit: limit_or(
            params.limit,
            MIN_MY_RATINGS_LIMIT,
            MAX_MY_RATINGS_LIMIT,
            MIN_MY_RATINGS_LIMIT,
        ),
        sort: RatingSort::parse_or_default(params.sort.as_deref()),
    }
}

pub async fn my_ratings(
    state: &CatalogState,
    principal: &Principal,
    params: &MyRatingsParams,
) -> ServiceResult<MyRatings> {
    state
        .ratings
        .list_for_user(principal.user_id, &normalize_my_ratings_query(params))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use agris_core::models::auth::Role;
    use agris_core::models::catalog::Product;
    use crate::testing::CatalogFixture;

    fn rate(stars: i32) -> RateRequest {
        RateRequest {
            stars,
            comment: Some("  solid  ".into()),
        }
    }

    fn seeded() -> (CatalogFixture, Product) {
        let fx = CatalogFixture::new();
        let phones = fx.store.add_category("Phones");
        let product = fx.store.add_product("Alpha", 10.0, &phones);
        (fx, product)
    }

    #[tokio::test]
    async fn stars_out_of_range_never_reach_the_store() {
        let (fx, product) = seeded();
        let caller = fx.auth.sign_in("Nguyen Van A", Role::User);

        for stars in [0, 6, -1] {
            let err = rate_product(&fx.state, &caller, product.id, rate(stars))
                .await
                .unwrap_err();
            assert_eq!(
                err,
                ServiceError::InvalidInput("stars must be between 1 and 5".into())
            );
            let err = update_rating(&fx.state, &caller, Uuid::new_v4(), rate(stars))
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
        assert_eq!(fx.store.calls.total(), 0);
        assert_eq!(fx.auth.info_calls(), 0);
    }

    #[tokio::test]
    async fn rate_product_embeds_fresh_aggregates_and_rater() {
        let (fx, product) = seeded();
        let caller = fx.auth.sign_in("Nguyen Van A", Role::User);

        // Warm the product entry so invalidation is observable.
        fx.state.products.get(product.id).await.unwrap();

        let resp = rate_product(&fx.state, &caller, product.id, rate(4))
            .await
            .unwrap();
        assert_eq!(resp.stars, 4);
        assert_eq!(resp.comment.as_deref(), Some("solid"));
        assert_eq!(resp.user.name, "Nguyen Van A");
        assert_eq!(resp.user.id, caller.user_id);
        assert_eq!(resp.product.id, product.id);
        assert_eq!(resp.product.total_ratings, 1);
        assert_eq!(resp.product.average_rating, 4.0);

        let fresh = fx.state.products.get(product.id).await.unwrap();
        assert_eq!(fresh.total_ratings, 1);
    }

    #[tokio::test]
    async fn second_rating_conflicts_without_mutation() {
        let (fx, product) = seeded();
        let caller = fx.auth.sign_in("Nguyen Van A", Role::User);

        rate_product(&fx.state, &caller, product.id, rate(4))
            .await
            .unwrap();
        let err = rate_product(&fx.state, &caller, product.id, rate(2))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Conflict("you have already rated this product".into())
        );
        assert_eq!(fx.store.calls("create_rating"), 1);
    }

    #[tokio::test]
    async fn rating_missing_product_is_not_found() {
        let (fx, _) = seeded();
        let caller = fx.auth.sign_in("Nguyen Van A", Role::User);
        let err = rate_product(&fx.state, &caller, Uuid::new_v4(), rate(3))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(fx.store.calls("create_rating"), 0);
    }

    #[tokio::test]
    async fn unreachable_user_service_blocks_writes() {
        let (fx, product) = seeded();
        let caller = fx.auth.sign_in("Nguyen Van A", Role::User);
        fx.auth.set_down(true);

        let err = rate_product(&fx.state, &caller, product.id, rate(3))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated(_)));
        assert_eq!(fx.store.calls("create_rating"), 0);
    }

    #[tokio::test]
    async fn only_the_author_may_change_a_rating() {
        let (fx, product) = seeded();
        let author = fx.auth.sign_in("Nguyen Van A", Role::User);
        let other = fx.auth.sign_in("Tran Thi B", Role::User);
        let created = rate_product(&fx.state, &author, product.id, rate(2))
            .await
            .unwrap();

        let err = update_rating(&fx.state, &other, created.id, rate(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let err = delete_rating(&fx.state, &other, created.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        assert_eq!(fx.store.calls("update_rating"), 0);
        assert_eq!(fx.store.calls("delete_rating"), 0);

        let updated = update_rating(&fx.state, &author, created.id, rate(5))
            .await
            .unwrap();
        assert_eq!(updated.stars, 5);
        assert_eq!(updated.product.average_rating, 5.0);

        delete_rating(&fx.state, &author, created.id).await.unwrap();
        let err = delete_rating(&fx.state, &author, created.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn writes_invalidate_statistics_and_my_ratings() {
        let (fx, product) = seeded();
        let caller = fx.auth.sign_in("Nguyen Van A", Role::User);
        let params = MyRatingsParams::default();

        let before_stats = statistics(&fx.state, product.id).await.unwrap();
        let before_mine = my_ratings(&fx.state, &caller, &params).await.unwrap();
        assert_eq!(before_stats.summary.total_ratings, 0);
        assert_eq!(before_mine.total, 0);

        rate_product(&fx.state, &caller, product.id, rate(4))
            .await
            .unwrap();

        let after_stats = statistics(&fx.state, product.id).await.unwrap();
        let after_mine = my_ratings(&fx.state, &caller, &params).await.unwrap();
        assert_ne!(after_stats, before_stats);
        assert_eq!(after_stats.summary.total_ratings, 1);
        assert_eq!(after_mine.total, 1);
        assert_eq!(after_mine.summary.avg_stars_given, 4.0);
    }

    #[test]
    fn rating_query_normalization() {
        let pid = Uuid::new_v4();
        let q = normalize_rating_query(
            pid,
            &RatingListParams {
                page: Some(0),
                limit: Some(1000),
                stars: Some(9),
                sort: Some("HIGHEST".into()),
            },
        );
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, MAX_RATING_LIMIT);
        assert_eq!(q.stars, None);
        assert_eq!(q.sort, RatingSort::Highest);

        let q = normalize_rating_query(pid, &RatingListParams::default());
        assert_eq!(q.limit, DEFAULT_RATING_LIMIT);
        assert_eq!(q.sort, RatingSort::Newest);
    }

    #[test]
    fn my_ratings_limit_window() {
        let q = normalize_my_ratings_query(&MyRatingsParams {
            page: None,
            limit: Some(3),
            sort: Some("bogus".into()),
        });
        assert_eq!(q.limit, MIN_MY_RATINGS_LIMIT);
        assert_eq!(q.sort, RatingSort::Newest);

        let q = normalize_my_ratings_query(&MyRatingsParams {
            page: Some(2),
            limit: Some(20),
            sort: Some("oldest".into()),
        });
        assert_eq!(q.page, 2);
        assert_eq!(q.limit, 20);
        assert_eq!(q.sort, RatingSort::Oldest);
    }
}
