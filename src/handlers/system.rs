use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::{cache, database, AppState};

/// GET / - service banner
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Catalog Gateway",
            "version": version,
            "environment": state.config.environment,
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "auth": "/api/auth, /api/auth/logout, /api/auth/whoami (rate limited)",
                "catalog": "/api/categories, /api/products[/shop/:page[/:category]|/:slug|/search|/cart] (rate limited)",
                "admin": "/api/admin/* (rate limited, admin session)",
            }
        }
    }))
}

/// GET /health - store and cache connectivity
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let db_timeout = state.config.database.statement_timeout();
    let cache_timeout = state.config.cache.op_timeout();

    let db = database::bounded(db_timeout, state.store.ping()).await;
    let cached = cache::bounded(cache_timeout, state.cache.ping()).await;

    let cache_status = match &cached {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "cache health check failed");
            "degraded".to_string()
        }
    };

    match db {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok",
                    "cache": cache_status,
                    "cache_backend": state.cache.backend(),
                }
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "cache": cache_status,
                    }
                })),
            )
        }
    }
}

/// Everything unrouted, including admin UI paths once they pass authorization.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}
