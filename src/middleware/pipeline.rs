use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::identity::ClientIdentity;
use super::route::{RouteClass, Surface};
use crate::auth::{AuthDenied, TOKEN_COOKIE};
use crate::limiter::Admission;
use crate::AppState;

/// Admission control, then authorization, then the route.
///
/// Runs on every request. A granted identity is inserted into the request
/// extensions as [`crate::auth::AuthUser`].
pub async fn request_pipeline(State(state): State<AppState>, jar: CookieJar, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let class = RouteClass::classify(&path);

    if class.is_rate_limited() {
        let identity = ClientIdentity::from_request(&request, state.config.server.trust_forwarded_headers);
        if let Admission::Rejected { retry_after } = state.limiter.admit(identity.as_str()) {
            warn!(identity = %identity, path = %path, "admission rejected");
            return too_many_requests(retry_after);
        }
    }

    let token = jar.get(TOKEN_COOKIE).map(|cookie| cookie.value().to_string());
    match state.gate.authorize(token.as_deref(), class) {
        Ok(Some(user)) => {
            if state.config.security.enable_audit_logging {
                info!(
                    subject = user.subject_id,
                    email = %user.email,
                    role = %user.role,
                    method = %request.method(),
                    path = %path,
                    "admin access granted"
                );
            }
            request.extensions_mut().insert(user);
        }
        Ok(None) => {}
        Err(denied) => {
            if denied == AuthDenied::NoToken {
                debug!(path = %path, "authorization denied: {}", denied);
            } else {
                warn!(path = %path, "authorization denied: {}", denied);
            }

            let requested = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or(path.clone());
            return deny(denied, Surface::of(&path), &requested, &state.config.security.login_path);
        }
    }

    next.run(request).await
}

fn too_many_requests(retry_after: Duration) -> Response {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, secs.max(1).to_string())],
        Json(json!({ "message": "Too many requests" })),
    )
        .into_response()
}

fn deny(denied: AuthDenied, surface: Surface, requested: &str, login_path: &str) -> Response {
    if surface == Surface::Ui && denied.redirects_to_login() {
        let next: String = url::form_urlencoded::byte_serialize(requested.as_bytes()).collect();
        return Redirect::temporary(&format!("{}?next={}", login_path, next)).into_response();
    }

    (StatusCode::UNAUTHORIZED, Json(json!({ "error": denied.to_string() }))).into_response()
}
