use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RenameCategory {
    pub name: String,
}

/// PUT /api/admin/categories/:id - rename a category
pub async fn rename(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    payload: Result<Json<RenameCategory>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = payload?;
    state.catalog.rename_category(id, request.name.clone()).await?;

    tracing::info!(actor = %user.email, category_id = id, name = %request.name, "admin renamed category");
    Ok(ApiResponse::success(json!({ "id": id, "name": request.name.trim() })))
}

/// DELETE /api/admin/categories/:id - delete a category and its memberships
pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    state.catalog.delete_category(id).await?;

    tracing::info!(actor = %user.email, category_id = id, "admin deleted category");
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}
