use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::read::{CatalogReadPath, Fetched};
use super::write::CatalogWritePath;
use super::CatalogError;
use crate::cache::{CacheKey, CacheKeyRegistry, CacheStore, KeyShape};
use crate::config::{AppConfig, CacheConfig};
use crate::database::models::{is_valid_slug, CartItem, ProductDraft};
use crate::database::{self, CatalogCommand, CatalogStore, CommitReceipt, DatabaseError};

const SEARCH_LIMIT: i64 = 5;
const ORDER_LIMIT: i64 = 100;

/// One storefront listing page as cached under `page:<n>` or
/// `category:<id>:page:<n>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage<T> {
    pub products: Vec<T>,
    pub total_rows: i64,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlugCheck {
    pub slug: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Named catalog operations over the cache-aside read path and the
/// commit-then-purge write path.
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    reads: Arc<CatalogReadPath>,
    writes: CatalogWritePath,
    registry: CacheKeyRegistry,
    limits: CacheConfig,
    db_timeout: Duration,
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, DatabaseError> {
    serde_json::to_value(value).map_err(|e| DatabaseError::QueryError(format!("Failed to encode row: {}", e)))
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>, cache: Arc<dyn CacheStore>, config: &AppConfig) -> Self {
        let db_timeout = config.database.statement_timeout();
        let cache_timeout = config.cache.op_timeout();
        let registry = CacheKeyRegistry::new(config.cache.page_size);

        let reads = Arc::new(CatalogReadPath::new(Arc::clone(&cache), cache_timeout, db_timeout));
        let writes = CatalogWritePath::new(
            Arc::clone(&store),
            cache,
            Arc::clone(&reads),
            registry,
            db_timeout,
            config.cache.purge_timeout(),
        );

        Self {
            store,
            reads,
            writes,
            registry,
            limits: config.cache.clone(),
            db_timeout,
        }
    }

    pub fn ttl_for(&self, key: &CacheKey) -> Duration {
        let secs = match key.shape() {
            KeyShape::Aggregate => self.limits.aggregate_ttl_secs,
            KeyShape::Entity => self.limits.entity_ttl_secs,
            KeyShape::Listing => self.limits.listing_ttl_secs,
        };
        Duration::from_secs(secs)
    }

    async fn cached<F, Fut>(&self, key: CacheKey, load: F) -> Result<Option<Value>, CatalogError>
    where
        F: FnOnce(Arc<dyn CatalogStore>) -> Fut,
        Fut: std::future::Future<Output = Result<Fetched, DatabaseError>> + Send + 'static,
    {
        let ttl = self.ttl_for(&key);
        let store = Arc::clone(&self.store);
        self.reads.read(&key, ttl, move || load(store)).await
    }

    async fn uncached<T, Fut>(&self, op: Fut) -> Result<T, CatalogError>
    where
        Fut: std::future::Future<Output = Result<T, DatabaseError>>,
    {
        Ok(database::bounded(self.db_timeout, op).await?)
    }

    // ---- storefront -------------------------------------------------------

    pub async fn categories(&self) -> Result<Value, CatalogError> {
        let limit = i64::from(self.limits.category_limit);
        let value = self
            .cached(CacheKey::Categories, move |store| async move {
                Ok(Fetched::cached(to_json(&store.categories(limit).await?)?))
            })
            .await?;
        Ok(value.unwrap_or_else(|| Value::Array(vec![])))
    }

    pub async fn featured_products(&self) -> Result<Value, CatalogError> {
        let limit = i64::from(self.limits.featured_limit);
        let value = self
            .cached(CacheKey::FeaturedProducts, move |store| async move {
                Ok(Fetched::cached(to_json(&store.product_page(None, limit, 0).await?)?))
            })
            .await?;
        Ok(value.unwrap_or_else(|| Value::Array(vec![])))
    }

    /// Listing page `page` (1-based), optionally filtered by category. Pages
    /// past the end come back empty and are not cached.
    pub async fn listing(&self, page: i64, category: Option<i64>) -> Result<Value, CatalogError> {
        let page = u32::try_from(page)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| CatalogError::BadRequest("Page must be a positive integer".to_string()))?;

        let key = match category {
            Some(id) => CacheKey::category_page(id, page),
            None => CacheKey::page(page),
        };
        let size = i64::from(self.limits.page_size);
        let registry = self.registry;

        let value = self
            .cached(key, move |store| async move {
                let total_rows = store.count_products(category).await?;
                let products = store.product_page(category, size, i64::from(page - 1) * size).await?;
                let listing = to_json(&ListingPage { products, total_rows, page })?;

                if page <= registry.page_count(total_rows) {
                    Ok(Fetched::cached(listing))
                } else {
                    Ok(Fetched::transient(listing))
                }
            })
            .await?;
        value.ok_or_else(|| CatalogError::NotFound("Listing not found".to_string()))
    }

    pub async fn product(&self, slug: &str) -> Result<Value, CatalogError> {
        let owned = slug.to_string();
        let value = self
            .cached(CacheKey::product(slug), move |store| async move {
                match store.product_by_slug(&owned).await? {
                    Some(detail) => Ok(Fetched::cached(to_json(&detail)?)),
                    None => Ok(Fetched::missing()),
                }
            })
            .await?;
        value.ok_or_else(|| CatalogError::NotFound("Product not found".to_string()))
    }

    pub async fn search(&self, query: &str) -> Result<Value, CatalogError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Value::Array(vec![]));
        }
        let hits = self.uncached(self.store.search_products(query, SEARCH_LIMIT)).await?;
        Ok(to_json(&hits)?)
    }

    pub async fn cart(&self, items: &[CartItem]) -> Result<Value, CatalogError> {
        let lines = self.uncached(self.store.cart_lines(items)).await?;
        Ok(to_json(&lines)?)
    }

    // ---- admin ------------------------------------------------------------

    pub async fn admin_products(&self) -> Result<Value, CatalogError> {
        let value = self
            .cached(CacheKey::AdminProducts, |store| async move {
                Ok(Fetched::cached(to_json(&store.admin_products().await?)?))
            })
            .await?;
        Ok(value.unwrap_or_else(|| Value::Array(vec![])))
    }

    /// Whether `slug` is free; when taken, suggests it with a short random suffix.
    pub async fn verify_slug(&self, slug: &str) -> Result<SlugCheck, CatalogError> {
        if !is_valid_slug(slug) {
            return Err(CatalogError::BadRequest(format!("Invalid slug '{}'", slug)));
        }
        let taken = self.uncached(self.store.slug_exists(slug)).await?;
        let suggestion = taken.then(|| {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("{}-{}", slug, &suffix[..4])
        });
        Ok(SlugCheck {
            slug: slug.to_string(),
            available: !taken,
            suggestion,
        })
    }

    pub async fn recent_orders(&self) -> Result<Value, CatalogError> {
        let orders = self.uncached(self.store.recent_orders(ORDER_LIMIT)).await?;
        Ok(to_json(&orders)?)
    }

    pub async fn order(&self, id: i64) -> Result<Value, CatalogError> {
        match self.uncached(self.store.order_detail(id)).await? {
            Some(order) => Ok(to_json(&order)?),
            None => Err(CatalogError::NotFound("Order not found".to_string())),
        }
    }

    pub async fn create_product(&self, draft: ProductDraft) -> Result<CommitReceipt, CatalogError> {
        self.write(CatalogCommand::CreateProduct(draft)).await
    }

    pub async fn update_product(&self, id: i64, draft: ProductDraft) -> Result<CommitReceipt, CatalogError> {
        self.write(CatalogCommand::UpdateProduct { id, draft }).await
    }

    pub async fn delete_product(&self, id: i64) -> Result<CommitReceipt, CatalogError> {
        self.write(CatalogCommand::DeleteProduct { id }).await
    }

    pub async fn rename_category(&self, id: i64, name: String) -> Result<CommitReceipt, CatalogError> {
        self.write(CatalogCommand::RenameCategory { id, name }).await
    }

    pub async fn delete_category(&self, id: i64) -> Result<CommitReceipt, CatalogError> {
        self.write(CatalogCommand::DeleteCategory { id }).await
    }

    async fn write(&self, command: CatalogCommand) -> Result<CommitReceipt, CatalogError> {
        let (receipt, _report) = self.writes.write(command).await?;
        Ok(receipt)
    }
}
