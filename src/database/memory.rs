//! In-process catalog store, used when no DATABASE_URL is configured and by
//! the integration tests. One write lock per command keeps `apply` atomic.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::models::{
    AdminProductRow, CartItem, CartLine, Category, OrderDetail, OrderSummary, Product, ProductDetail, ProductDraft,
    ProductHit, ProductSummary, UserCredentials, Variation,
};
use super::store::{CatalogCommand, CatalogStore, CommitReceipt};
use super::DatabaseError;
use crate::cache::{CatalogMutation, CountChange, ListingTotals, ProductSnapshot};

#[derive(Debug, Default)]
struct CatalogState {
    categories: BTreeMap<i64, Category>,
    products: BTreeMap<i64, Product>,
    memberships: BTreeMap<i64, BTreeSet<i64>>,
    variations: BTreeMap<i64, Vec<Variation>>,
    users: Vec<UserCredentials>,
    orders: BTreeMap<i64, OrderDetail>,
    last_id: i64,
}

impl CatalogState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn in_category(&self, product_id: i64, category: Option<i64>) -> bool {
        match category {
            None => true,
            Some(c) => self.memberships.get(&product_id).is_some_and(|m| m.contains(&c)),
        }
    }

    fn count(&self, category: Option<i64>) -> i64 {
        self.products.keys().filter(|id| self.in_category(**id, category)).count() as i64
    }

    fn counts(&self, ids: &BTreeSet<i64>) -> BTreeMap<i64, i64> {
        ids.iter().map(|id| (*id, self.count(Some(*id)))).collect()
    }

    fn first_category_name(&self, product_id: i64) -> Option<String> {
        self.memberships
            .get(&product_id)?
            .iter()
            .find_map(|id| self.categories.get(id))
            .map(|c| c.name.clone())
    }

    fn mrp_range(&self, product_id: i64) -> (Option<f64>, Option<f64>) {
        let prices: Vec<f64> = self
            .variations
            .get(&product_id)
            .map(|vs| vs.iter().map(|v| v.variation_mrp).collect())
            .unwrap_or_default();
        let min = prices.iter().copied().reduce(f64::min);
        let max = prices.iter().copied().reduce(f64::max);
        (min, max)
    }

    fn slug_owner(&self, slug: &str) -> Option<i64> {
        self.products.values().find(|p| p.slug == slug).map(|p| p.id)
    }

    fn check_draft(&self, draft: &ProductDraft, own_id: Option<i64>) -> Result<BTreeSet<i64>, DatabaseError> {
        draft.validate().map_err(DatabaseError::Invalid)?;
        if let Some(owner) = self.slug_owner(&draft.slug) {
            if Some(owner) != own_id {
                return Err(DatabaseError::Conflict(format!("Slug '{}' is already in use", draft.slug)));
            }
        }
        let categories: BTreeSet<i64> = draft.category_ids().into_iter().collect();
        if let Some(missing) = categories.iter().find(|id| !self.categories.contains_key(id)) {
            return Err(DatabaseError::Invalid(format!("Category {} does not exist", missing)));
        }
        Ok(categories)
    }

    fn write_product(&mut self, id: i64, draft: &ProductDraft, categories: BTreeSet<i64>) {
        let now = Utc::now();
        let created_at = self.products.get(&id).map(|p| p.created_at).unwrap_or(now);
        self.products.insert(
            id,
            Product {
                id,
                name: draft.name.clone(),
                slug: draft.slug.clone(),
                short_description: draft.short_description.clone(),
                description: draft.description.clone(),
                price: draft.price,
                mrp: draft.mrp,
                sku: draft.sku.clone(),
                status: draft.status.clone(),
                stock: draft.stock,
                image_url: draft.image_url.clone(),
                images: draft.normalized_images(),
                created_at,
                updated_at: now,
            },
        );
        self.memberships.insert(id, categories);

        let variations = draft
            .variations
            .iter()
            .map(|v| Variation {
                id: self.next_id(),
                product_id: id,
                variation_name: v.variation_name.clone(),
                variation_sku: v.variation_sku.clone(),
                variation_price: v.variation_price,
                variation_mrp: v.variation_mrp,
            })
            .collect();
        self.variations.insert(id, variations);
    }

    fn remove_product(&mut self, id: i64) -> Option<Product> {
        self.memberships.remove(&id);
        self.variations.remove(&id);
        self.products.remove(&id)
    }

    fn snapshot(&self, id: i64) -> Option<ProductSnapshot> {
        let product = self.products.get(&id)?;
        let categories = self.memberships.get(&id).cloned().unwrap_or_default();
        Some(ProductSnapshot::new(product.slug.clone(), categories))
    }

    fn apply(&mut self, command: CatalogCommand) -> Result<CommitReceipt, DatabaseError> {
        match command {
            CatalogCommand::CreateProduct(draft) => {
                let categories = self.check_draft(&draft, None)?;
                let products_before = self.count(None);
                let categories_before = self.counts(&categories);

                let id = self.next_id();
                self.write_product(id, &draft, categories.clone());

                let totals = ListingTotals {
                    all_products: Some(CountChange::new(products_before, self.count(None))),
                    per_category: self.paired(categories_before),
                };
                Ok(CommitReceipt {
                    mutation: CatalogMutation::ProductCreated {
                        after: ProductSnapshot::new(draft.slug, categories),
                        totals,
                    },
                    product_id: Some(id),
                })
            }
            CatalogCommand::UpdateProduct { id, draft } => {
                let before = self
                    .snapshot(id)
                    .ok_or_else(|| DatabaseError::NotFound("Product not found".to_string()))?;
                let categories = self.check_draft(&draft, Some(id))?;
                let touched: BTreeSet<i64> = before.categories.union(&categories).copied().collect();
                let categories_before = self.counts(&touched);

                self.write_product(id, &draft, categories.clone());

                let totals = ListingTotals {
                    all_products: Some(CountChange::unchanged(self.count(None))),
                    per_category: self.paired(categories_before),
                };
                Ok(CommitReceipt {
                    mutation: CatalogMutation::ProductUpdated {
                        before,
                        after: ProductSnapshot::new(draft.slug, categories),
                        totals,
                    },
                    product_id: Some(id),
                })
            }
            CatalogCommand::DeleteProduct { id } => {
                let before = self
                    .snapshot(id)
                    .ok_or_else(|| DatabaseError::NotFound("Product not found".to_string()))?;
                let products_before = self.count(None);
                let categories_before = self.counts(&before.categories);

                self.remove_product(id);

                let totals = ListingTotals {
                    all_products: Some(CountChange::new(products_before, self.count(None))),
                    per_category: self.paired(categories_before),
                };
                Ok(CommitReceipt {
                    mutation: CatalogMutation::ProductDeleted { before, totals },
                    product_id: Some(id),
                })
            }
            CatalogCommand::RenameCategory { id, name } => {
                if name.trim().is_empty() {
                    return Err(DatabaseError::Invalid("Category name is required".to_string()));
                }
                let category = self
                    .categories
                    .get_mut(&id)
                    .ok_or_else(|| DatabaseError::NotFound(format!("Category {} not found", id)))?;
                category.name = name.trim().to_string();
                Ok(CommitReceipt {
                    mutation: CatalogMutation::CategoryChanged { category_id: id },
                    product_id: None,
                })
            }
            CatalogCommand::DeleteCategory { id } => {
                self.categories
                    .remove(&id)
                    .ok_or_else(|| DatabaseError::NotFound(format!("Category {} not found", id)))?;
                for members in self.memberships.values_mut() {
                    members.remove(&id);
                }
                Ok(CommitReceipt {
                    mutation: CatalogMutation::CategoryChanged { category_id: id },
                    product_id: None,
                })
            }
        }
    }

    fn paired(&self, before: BTreeMap<i64, i64>) -> BTreeMap<i64, CountChange> {
        before
            .into_iter()
            .map(|(id, b)| (id, CountChange::new(b, self.count(Some(id)))))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalogStore {
    state: Arc<RwLock<CatalogState>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_category(&self, id: i64, name: impl Into<String>) {
        let mut state = self.state.write().await;
        state.last_id = state.last_id.max(id);
        state.categories.insert(id, Category { id, name: name.into() });
    }

    pub async fn insert_user(&self, user: UserCredentials) {
        let mut state = self.state.write().await;
        state.last_id = state.last_id.max(user.id);
        state.users.push(user);
    }

    pub async fn insert_order(&self, order: OrderDetail) {
        let mut state = self.state.write().await;
        state.last_id = state.last_id.max(order.summary.id);
        state.orders.insert(order.summary.id, order);
    }

    /// Create a product and return its id.
    pub async fn insert_product(&self, draft: ProductDraft) -> Result<i64, DatabaseError> {
        let receipt = self.state.write().await.apply(CatalogCommand::CreateProduct(draft))?;
        receipt
            .product_id
            .ok_or_else(|| DatabaseError::QueryError("create returned no id".to_string()))
    }

    pub async fn product_id_by_slug(&self, slug: &str) -> Option<i64> {
        self.state.read().await.slug_owner(slug)
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn categories(&self, limit: i64) -> Result<Vec<Category>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .categories
            .values()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn product_page(
        &self,
        category: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductSummary>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .products
            .values()
            .rev()
            .filter(|p| state.in_category(p.id, category))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|p| {
                let (min_price, max_price) = state.mrp_range(p.id);
                ProductSummary {
                    id: p.id,
                    name: p.name.clone(),
                    slug: p.slug.clone(),
                    short_description: p.short_description.clone(),
                    image_url: p.image_url.clone(),
                    min_price,
                    max_price,
                    category: state.first_category_name(p.id),
                }
            })
            .collect())
    }

    async fn count_products(&self, category: Option<i64>) -> Result<i64, DatabaseError> {
        Ok(self.state.read().await.count(category))
    }

    async fn admin_products(&self) -> Result<Vec<AdminProductRow>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .products
            .values()
            .rev()
            .map(|p| AdminProductRow {
                id: p.id,
                name: p.name.clone(),
                slug: p.slug.clone(),
                images: Some(p.images.clone()),
                short_description: p.short_description.as_ref().map(|d| d.chars().take(50).collect()),
                max_price: state.mrp_range(p.id).1,
                category_name: state.first_category_name(p.id),
            })
            .collect())
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<ProductDetail>, DatabaseError> {
        let state = self.state.read().await;
        let Some(product) = state.products.values().find(|p| p.slug == slug) else {
            return Ok(None);
        };
        let categories: Vec<i64> = state
            .memberships
            .get(&product.id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        let category_names = categories
            .iter()
            .filter_map(|id| state.categories.get(id))
            .map(|c| c.name.clone())
            .collect();
        Ok(Some(ProductDetail {
            product: product.clone(),
            categories,
            category_names,
            variations: state.variations.get(&product.id).cloned().unwrap_or_default(),
        }))
    }

    async fn search_products(&self, query: &str, limit: i64) -> Result<Vec<ProductHit>, DatabaseError> {
        let needle = query.to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .products
            .values()
            .rev()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .take(limit.max(0) as usize)
            .map(|p| ProductHit { id: p.id, name: p.name.clone() })
            .collect())
    }

    async fn cart_lines(&self, items: &[CartItem]) -> Result<Vec<CartLine>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .products
            .values()
            .rev()
            .filter_map(|p| {
                let item = items.iter().find(|i| i.id == p.id)?;
                Some(CartLine {
                    product: p.clone(),
                    quantity: item.quantity.filter(|q| *q > 0).unwrap_or(1),
                })
            })
            .collect())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, DatabaseError> {
        Ok(self.state.read().await.slug_owner(slug).is_some())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserCredentials>, DatabaseError> {
        Ok(self.state.read().await.users.iter().find(|u| u.email == email).cloned())
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<OrderSummary>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .rev()
            .take(limit.max(0) as usize)
            .map(|o| o.summary.clone())
            .collect())
    }

    async fn order_detail(&self, id: i64) -> Result<Option<OrderDetail>, DatabaseError> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn apply(&self, command: CatalogCommand) -> Result<CommitReceipt, DatabaseError> {
        self.state.write().await.apply(command)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
