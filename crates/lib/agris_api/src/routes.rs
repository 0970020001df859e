//! Route paths of both services.

pub const GET_HEALTH: &str = "/health";

// User service
pub const POST_USERS_LOGIN: &str = "/users/login";
pub const POST_USERS_REGISTER: &str = "/users/register";
pub const POST_USERS_REFRESH: &str = "/users/refresh";
pub const POST_USERS_LOGOUT: &str = "/users/logout";
pub const GET_USERS_ME: &str = "/users/me";
pub const PUT_USERS_ME_PASSWORD: &str = "/users/me/password";
pub const GET_USERS_LIST: &str = "/users/list";
pub const PATCH_USERS_ID_ROLE: &str = "/users/{userId}/role";
pub const DELETE_USERS_ID: &str = "/users/{userId}";

// Catalog service
pub const GET_PRODUCTS_LIST: &str = "/products/list";
pub const GET_PRODUCTS_ID: &str = "/products/product/{id}";
pub const GET_PRODUCTS_ID_SIMILAR: &str = "/products/product/{id}/similar";
pub const GET_PRODUCTS_ID_RELATED: &str = "/products/product/{id}/related";
/// Shared by the product's rating list (GET) and one rating (PUT/DELETE);
/// the router needs one parameter name per path shape.
pub const PRODUCTS_RATINGS_ID: &str = "/products/ratings/{id}";
pub const GET_PRODUCTS_RATINGS_STATISTIC_ID: &str = "/products/ratings/statistic/{productId}";
pub const POST_PRODUCTS_ID_RATINGS: &str = "/products/{productId}/ratings";
pub const GET_RATINGS_ME: &str = "/ratings/me";
