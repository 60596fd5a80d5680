pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod middleware;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{AuthorizationGate, Clock, SystemClock, TokenError, TokenIssuer};
use crate::cache::CacheStore;
use crate::catalog::CatalogService;
use crate::config::AppConfig;
use crate::database::CatalogStore;
use crate::limiter::FixedWindowLimiter;

/// Everything a request needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub gate: Arc<AuthorizationGate>,
    pub issuer: Arc<TokenIssuer>,
    pub catalog: Arc<CatalogService>,
    pub store: Arc<dyn CatalogStore>,
    pub cache: Arc<dyn CacheStore>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn CatalogStore>, cache: Arc<dyn CacheStore>) -> Result<Self, TokenError> {
        Self::with_clock(config, store, cache, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AppConfig,
        store: Arc<dyn CatalogStore>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        let gate = AuthorizationGate::from_config(&config.security, Arc::clone(&clock))?;
        let issuer = TokenIssuer::from_config(&config.security, clock)?;
        let limiter = FixedWindowLimiter::from_config(&config.rate_limit);
        let catalog = CatalogService::new(Arc::clone(&store), Arc::clone(&cache), &config);

        Ok(Self {
            config: Arc::new(config),
            limiter: Arc::new(limiter),
            gate: Arc::new(gate),
            issuer: Arc::new(issuer),
            catalog: Arc::new(catalog),
            store,
            cache,
        })
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(handlers::system::root))
        .route("/health", get(handlers::system::health))
        // Storefront API (rate limited)
        .merge(auth_routes())
        .merge(catalog_routes())
        // Admin API (rate limited + admin role)
        .merge(admin_routes())
        // Admin UI paths are gated by the pipeline, then fall through here
        .fallback(handlers::system::not_found)
        // Global middleware
        .layer(from_fn_with_state(state.clone(), middleware::request_pipeline))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    use handlers::public::auth;

    Router::new()
        .route("/api/auth", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/whoami", get(auth::whoami))
}

fn catalog_routes() -> Router<AppState> {
    use handlers::public::catalog;

    Router::new()
        .route("/api/categories", get(catalog::categories))
        .route("/api/products", get(catalog::featured))
        .route("/api/products/search", get(catalog::search))
        .route("/api/products/cart", post(catalog::cart))
        .route("/api/products/shop/:page", get(catalog::listing))
        .route("/api/products/shop/:page/:category", get(catalog::category_listing))
        .route("/api/products/:slug", get(catalog::product))
}

fn admin_routes() -> Router<AppState> {
    use axum::routing::delete;
    use handlers::admin::{categories, orders, products};

    Router::new()
        .route("/api/admin/products", get(products::list))
        .route("/api/admin/products/save", post(products::create))
        .route("/api/admin/products/save/:id", put(products::update))
        .route("/api/admin/products/delete/:id", delete(products::remove))
        .route("/api/admin/products/verify/:slug", get(products::verify_slug))
        .route("/api/admin/categories/:id", put(categories::rename).delete(categories::remove))
        .route("/api/admin/orders", get(orders::list))
        .route("/api/admin/orders/:id", get(orders::detail))
}
