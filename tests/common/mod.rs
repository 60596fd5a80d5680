#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use catalog_gateway::auth::{FixedClock, SessionKeys, TokenIssuer};
use catalog_gateway::cache::{CacheStore, MemoryCacheStore};
use catalog_gateway::config::{AppConfig, Environment};
use catalog_gateway::database::models::{
    AdminProductRow, CartItem, CartLine, Category, OrderDetail, OrderSummary, ProductDetail, ProductDraft, ProductHit,
    ProductSummary, UserCredentials,
};
use catalog_gateway::database::{CatalogCommand, CatalogStore, CommitReceipt, DatabaseError, MemoryCatalogStore};
use catalog_gateway::{app, AppState};

pub const SECRET: &str = "integration-test-secret";

/// Counts every call into the store of record, optionally slowing reads down.
#[derive(Clone)]
pub struct CountingStore {
    inner: MemoryCatalogStore,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingStore {
    pub fn new(inner: MemoryCatalogStore) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    async fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CatalogStore for CountingStore {
    async fn categories(&self, limit: i64) -> Result<Vec<Category>, DatabaseError> {
        self.hit().await;
        self.inner.categories(limit).await
    }

    async fn product_page(
        &self,
        category: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductSummary>, DatabaseError> {
        self.hit().await;
        self.inner.product_page(category, limit, offset).await
    }

    async fn count_products(&self, category: Option<i64>) -> Result<i64, DatabaseError> {
        self.hit().await;
        self.inner.count_products(category).await
    }

    async fn admin_products(&self) -> Result<Vec<AdminProductRow>, DatabaseError> {
        self.hit().await;
        self.inner.admin_products().await
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<ProductDetail>, DatabaseError> {
        self.hit().await;
        self.inner.product_by_slug(slug).await
    }

    async fn search_products(&self, query: &str, limit: i64) -> Result<Vec<ProductHit>, DatabaseError> {
        self.hit().await;
        self.inner.search_products(query, limit).await
    }

    async fn cart_lines(&self, items: &[CartItem]) -> Result<Vec<CartLine>, DatabaseError> {
        self.hit().await;
        self.inner.cart_lines(items).await
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, DatabaseError> {
        self.hit().await;
        self.inner.slug_exists(slug).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserCredentials>, DatabaseError> {
        self.hit().await;
        self.inner.user_by_email(email).await
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<OrderSummary>, DatabaseError> {
        self.hit().await;
        self.inner.recent_orders(limit).await
    }

    async fn order_detail(&self, id: i64) -> Result<Option<OrderDetail>, DatabaseError> {
        self.hit().await;
        self.inner.order_detail(id).await
    }

    async fn apply(&self, command: CatalogCommand) -> Result<CommitReceipt, DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.apply(command).await
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.inner.ping().await
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::for_environment(Environment::Development);
    config.security.jwt_secret = SECRET.to_string();
    config.server.trust_forwarded_headers = true;
    config.rate_limit.capacity = 10_000;
    config.rate_limit.window_secs = 60;
    config.database.statement_timeout_ms = 500;
    config
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemoryCatalogStore,
    pub counting: CountingStore,
    pub cache: MemoryCacheStore,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let cache = MemoryCacheStore::new();
        Self::build(config, Arc::new(cache.clone()), cache, None).await
    }

    /// Store reads sleep for `delay`, so concurrent requests overlap.
    pub async fn with_slow_store(delay: Duration) -> Self {
        let cache = MemoryCacheStore::new();
        Self::build(test_config(), Arc::new(cache.clone()), cache, Some(delay)).await
    }

    /// Serve through `cache` instead of the in-memory one.
    pub async fn with_cache(cache: Arc<dyn CacheStore>) -> Self {
        Self::build(test_config(), cache, MemoryCacheStore::new(), None).await
    }

    async fn build(config: AppConfig, cache: Arc<dyn CacheStore>, memory: MemoryCacheStore, delay: Option<Duration>) -> Self {
        let store = MemoryCatalogStore::new();
        store.insert_category(7, "Vitamins").await;
        store.insert_category(9, "Minerals").await;

        let mut counting = CountingStore::new(store.clone());
        if let Some(delay) = delay {
            counting = counting.with_delay(delay);
        }

        let state = AppState::new(config, Arc::new(counting.clone()), cache).expect("test state");
        Self {
            router: app(state.clone()),
            state,
            store,
            counting,
            cache: memory,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response> {
        let response = self.router.clone().oneshot(request).await.context("router call failed")?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok(Response { status, headers, body })
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        self.send(request(Method::GET, path, None, None)?).await
    }

    pub async fn get_from(&self, path: &str, client: &str) -> Result<Response> {
        let mut request = request(Method::GET, path, None, None)?;
        request.headers_mut().insert("x-forwarded-for", client.parse()?);
        self.send(request).await
    }

    pub async fn get_as(&self, path: &str, token: &str) -> Result<Response> {
        self.send(request(Method::GET, path, Some(token), None)?).await
    }

    pub async fn send_json(&self, method: Method, path: &str, token: Option<&str>, body: Value) -> Result<Response> {
        self.send(request(method, path, token, Some(body))?).await
    }

    pub fn token_for(&self, id: i64, role: &str) -> String {
        let (token, _) = self
            .state
            .issuer
            .issue(id, role, &format!("user{}@example.com", id), "Test User")
            .expect("issue token");
        token
    }

    pub fn admin_token(&self) -> String {
        self.token_for(1, "admin")
    }

    /// Seed a product directly in the store, bypassing the write path.
    pub async fn seed_product(&self, name: &str, slug: &str, categories: &[i64]) -> i64 {
        self.store.insert_product(draft(name, slug, categories)).await.expect("seed product")
    }
}

pub fn request(method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("x-forwarded-for", "10.1.1.1");
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("token={}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };
    Ok(request)
}

pub fn draft(name: &str, slug: &str, categories: &[i64]) -> ProductDraft {
    serde_json::from_value(draft_json(name, slug, categories)).expect("valid draft")
}

pub fn draft_json(name: &str, slug: &str, categories: &[i64]) -> Value {
    json!({
        "name": name,
        "slug": slug,
        "short_description": format!("{} supplement", name),
        "stock": 10,
        "categories": categories,
        "variations": [
            { "variation_name": "60 caps", "variation_price": 9.0, "variation_mrp": 12.0 }
        ]
    })
}

/// A token signed with the right secret that expired an hour ago.
pub fn expired_token(role: &str) -> String {
    let issued = Utc::now() - chrono::Duration::hours(2);
    let issuer = TokenIssuer::new(
        SessionKeys::from_secret(SECRET).expect("keys"),
        chrono::Duration::hours(1),
        Arc::new(FixedClock(issued)),
    );
    issuer.issue(1, role, "admin@example.com", "Admin").expect("issue").0
}

/// A well-formed token signed with some other secret.
pub fn forged_token(role: &str) -> String {
    let issuer = TokenIssuer::new(
        SessionKeys::from_secret("not-the-server-secret").expect("keys"),
        chrono::Duration::hours(1),
        Arc::new(FixedClock(Utc::now())),
    );
    issuer.issue(1, role, "admin@example.com", "Admin").expect("issue").0
}
