use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{password, TOKEN_COOKIE};
use crate::database;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// POST /api/auth - Authenticate with email and password
///
/// Sets the `token` cookie (HttpOnly, SameSite=Lax, Max-Age of the token lifetime)
/// and also returns the token.
///
/// Expected Output (Success):
/// ```json
/// {
///   "success": true,
///   "data": {
///     "token": "eyJhbGciOiJIUzI1NiI...",
///     "user": { "id": 1, "name": "Admin", "email": "admin@example.com", "role": "admin" },
///     "expires_at": 1767225600
///   }
/// }
/// ```
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, ApiResponse<Value>), ApiError> {
    let Json(request) = payload?;
    let email = request.email.trim().to_lowercase();
    if email.is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let timeout = state.config.database.statement_timeout();
    let user = database::bounded(timeout, state.store.user_by_email(&email)).await?;
    let Some(user) = user else {
        tracing::warn!(email = %email, "login failed: unknown email");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    // argon2 verification blocks
    let stored_hash = user.password.clone();
    let supplied = request.password;
    let verified = tokio::task::spawn_blocking(move || password::verify_password(&supplied, &stored_hash))
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Password check failed: {}", e)))??;

    if !verified {
        tracing::warn!(email = %email, "login failed: wrong password");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let (token, claims) = state.issuer.issue(user.id, &user.role, &user.email, &user.name)?;
    tracing::info!(subject = user.id, email = %user.email, role = %user.role, "login succeeded");

    let cookie = Cookie::build((TOKEN_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.security.secure_cookies)
        .max_age(time::Duration::seconds(state.issuer.ttl().num_seconds()));

    Ok((
        jar.add(cookie),
        ApiResponse::success(json!({
            "token": token,
            "user": {
                "id": user.id,
                "name": user.name,
                "email": user.email,
                "role": user.role,
            },
            "expires_at": claims.exp,
        })),
    ))
}

/// POST /api/auth/logout - Clear the session cookie
///
/// Tokens are stateless; one that was copied elsewhere stays valid until it expires.
pub async fn logout(jar: CookieJar) -> (CookieJar, ApiResponse<Value>) {
    let mut cookie = Cookie::from(TOKEN_COOKIE);
    cookie.set_path("/");
    (jar.remove(cookie), ApiResponse::success(json!({ "logged_out": true })))
}

/// GET /api/auth/whoami - Claims of the current session cookie
pub async fn whoami(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Value> {
    let token = jar
        .get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::unauthorized("No token"))?;

    let claims = state
        .gate
        .verify(&token)
        .map_err(|denied| ApiError::unauthorized(denied.to_string()))?;

    Ok(ApiResponse::success(json!({
        "id": claims.sub,
        "name": claims.name,
        "email": claims.email,
        "role": claims.role,
        "expires_at": claims.exp,
    })))
}
