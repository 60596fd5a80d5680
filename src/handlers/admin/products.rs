use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::catalog::SlugCheck;
use crate::database::models::ProductDraft;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::AppState;

/// GET /api/admin/products - admin product table (cached as `adminProducts`)
pub async fn list(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(ApiResponse::success(state.catalog.admin_products().await?))
}

/// POST /api/admin/products/save - create a product with its variations and categories
///
/// Expected Input:
/// ```json
/// {
///   "name": "Vitamin C",
///   "slug": "vitamin-c",
///   "categories": [7],
///   "variations": [ { "variation_name": "60 caps", "variation_price": 9.5, "variation_mrp": 12 } ]
/// }
/// ```
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<ProductDraft>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(draft) = payload?;
    let slug = draft.slug.clone();
    let receipt = state.catalog.create_product(draft).await?;

    tracing::info!(actor = %user.email, product_id = ?receipt.product_id, slug = %slug, "admin created product");
    Ok(ApiResponse::created(json!({ "id": receipt.product_id, "slug": slug })))
}

/// PUT /api/admin/products/save/:id - replace a product, its variations and categories
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    payload: Result<Json<ProductDraft>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(draft) = payload?;
    let slug = draft.slug.clone();
    state.catalog.update_product(id, draft).await?;

    tracing::info!(actor = %user.email, product_id = id, slug = %slug, "admin updated product");
    Ok(ApiResponse::success(json!({ "id": id, "slug": slug })))
}

/// DELETE /api/admin/products/delete/:id
pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    state.catalog.delete_product(id).await?;

    tracing::info!(actor = %user.email, product_id = id, "admin deleted product");
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

/// GET /api/admin/products/verify/:slug - slug availability
pub async fn verify_slug(State(state): State<AppState>, Path(slug): Path<String>) -> ApiResult<SlugCheck> {
    Ok(ApiResponse::success(state.catalog.verify_slug(&slug).await?))
}
