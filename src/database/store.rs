use async_trait::async_trait;

use super::models::{
    AdminProductRow, CartItem, CartLine, Category, OrderDetail, OrderSummary, ProductDetail, ProductDraft, ProductHit,
    ProductSummary, UserCredentials,
};
use super::DatabaseError;
use crate::cache::CatalogMutation;

/// A catalog write, applied atomically by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogCommand {
    CreateProduct(ProductDraft),
    UpdateProduct { id: i64, draft: ProductDraft },
    DeleteProduct { id: i64 },
    RenameCategory { id: i64, name: String },
    DeleteCategory { id: i64 },
}

/// What a committed command changed, captured inside its transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    pub mutation: CatalogMutation,
    pub product_id: Option<i64>,
}

/// Store of record for the catalog, orders and users.
///
/// `apply` is all-or-nothing: on error nothing it wrote is visible.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Newest categories first.
    async fn categories(&self, limit: i64) -> Result<Vec<Category>, DatabaseError>;

    /// Newest products first, optionally restricted to one category.
    async fn product_page(
        &self,
        category: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductSummary>, DatabaseError>;

    async fn count_products(&self, category: Option<i64>) -> Result<i64, DatabaseError>;

    async fn admin_products(&self) -> Result<Vec<AdminProductRow>, DatabaseError>;

    async fn product_by_slug(&self, slug: &str) -> Result<Option<ProductDetail>, DatabaseError>;

    /// Case-insensitive substring match on product name.
    async fn search_products(&self, query: &str, limit: i64) -> Result<Vec<ProductHit>, DatabaseError>;

    async fn cart_lines(&self, items: &[CartItem]) -> Result<Vec<CartLine>, DatabaseError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, DatabaseError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<UserCredentials>, DatabaseError>;

    async fn recent_orders(&self, limit: i64) -> Result<Vec<OrderSummary>, DatabaseError>;

    async fn order_detail(&self, id: i64) -> Result<Option<OrderDetail>, DatabaseError>;

    async fn apply(&self, command: CatalogCommand) -> Result<CommitReceipt, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}
