use axum::extract::{Path, State};
use serde_json::Value;

use crate::middleware::{ApiResponse, ApiResult};
use crate::AppState;

/// GET /api/admin/orders - latest 100 orders
pub async fn list(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(ApiResponse::success(state.catalog.recent_orders().await?))
}

/// GET /api/admin/orders/:id - one order with its line items
pub async fn detail(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Value> {
    Ok(ApiResponse::success(state.catalog.order(id).await?))
}
