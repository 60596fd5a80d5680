use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::database::models::CartItem;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CartRequest {
    #[serde(default)]
    pub items: Vec<CartItem>,
}

fn parse_number(raw: &str, what: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request(format!("{} must be an integer", what)))
}

/// GET /api/categories - newest categories (cached as `categories`)
pub async fn categories(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(ApiResponse::success(state.catalog.categories().await?))
}

/// GET /api/products - featured products (cached as `featuredProducts`)
pub async fn featured(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(ApiResponse::success(state.catalog.featured_products().await?))
}

/// GET /api/products/shop/:page - `{products, totalRows, page}` (cached as `page:<n>`)
pub async fn listing(State(state): State<AppState>, Path(page): Path<String>) -> ApiResult<Value> {
    let page = parse_number(&page, "Page")?;
    Ok(ApiResponse::success(state.catalog.listing(page, None).await?))
}

/// GET /api/products/shop/:page/:category - one category's listing
/// (cached as `category:<id>:page:<n>`)
pub async fn category_listing(
    State(state): State<AppState>,
    Path((page, category)): Path<(String, String)>,
) -> ApiResult<Value> {
    let page = parse_number(&page, "Page")?;
    let category = parse_number(&category, "Category")?;
    Ok(ApiResponse::success(state.catalog.listing(page, Some(category)).await?))
}

/// GET /api/products/:slug - product detail (cached as `product:<slug>`)
pub async fn product(State(state): State<AppState>, Path(slug): Path<String>) -> ApiResult<Value> {
    Ok(ApiResponse::success(state.catalog.product(&slug).await?))
}

/// GET /api/products/search?q= - name search, uncached
pub async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> ApiResult<Value> {
    let q = query.q.unwrap_or_default();
    Ok(ApiResponse::success(state.catalog.search(&q).await?))
}

/// POST /api/products/cart - price a cart, uncached
///
/// ```json
/// { "items": [ { "id": 12, "quantity": 2 } ] }
/// ```
pub async fn cart(State(state): State<AppState>, payload: Result<Json<CartRequest>, JsonRejection>) -> ApiResult<Value> {
    let Json(request) = payload?;
    Ok(ApiResponse::success(state.catalog.cart(&request.items).await?))
}
