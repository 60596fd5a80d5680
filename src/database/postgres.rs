//! Postgres store of record. Every query is parameterized; writes run in a
//! single transaction and roll back when dropped without commit.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::collections::{BTreeMap, BTreeSet};

use super::models::{
    AdminProductRow, CartItem, CartLine, Category, OrderCustomer, OrderDetail, OrderLine, OrderSummary, Product,
    ProductDetail, ProductDraft, ProductHit, ProductSummary, UserCredentials, Variation,
};
use super::store::{CatalogCommand, CatalogStore, CommitReceipt};
use super::{DatabaseError, DatabaseManager};
use crate::cache::{CatalogMutation, CountChange, ListingTotals, ProductSnapshot};

const PRODUCT_COLUMNS: &str = r#"
    p.id, p.name, p.slug, p.short_description, p.description,
    p.price::float8 AS price, p.mrp::float8 AS mrp, p.sku, p.status, p.stock,
    p.image_url, p.images, p.created_at, p.updated_at
"#;

const FIRST_CATEGORY_NAME: &str = r#"
    (SELECT c.name FROM product_categories pc
       JOIN categories c ON c.id = pc.category_id
      WHERE pc.product_id = p.id
      ORDER BY c.id
      LIMIT 1)
"#;

const ORDER_SUMMARY_SELECT: &str = r#"
    SELECT
        o.id,
        o.total_value::float8 AS total_value,
        o.status,
        o.created_at,
        u.name,
        u.city,
        u.country,
        s.method_name AS shipping_method,
        pm.method_name AS payment_method
    FROM orders o
    LEFT JOIN users u ON u.id = o.user_id
    LEFT JOIN shipping_methods s ON s.id = o.shipping_method
    LEFT JOIN payment_methods pm ON pm.id = o.payment_method
"#;

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn create_product(&self, draft: ProductDraft) -> Result<CommitReceipt, DatabaseError> {
        draft.validate().map_err(DatabaseError::Invalid)?;
        let categories: BTreeSet<i64> = draft.category_ids().into_iter().collect();

        let mut tx = self.pool.begin().await?;
        let products_before = count_all(&mut tx).await?;
        let categories_before = count_categories(&mut tx, &categories).await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (
                name, slug, short_description, description, price, mrp,
                sku, status, stock, image_url, images, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5::numeric, $6::numeric, $7, $8, $9, $10, $11, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.slug)
        .bind(&draft.short_description)
        .bind(&draft.description)
        .bind(draft.price)
        .bind(draft.mrp)
        .bind(draft.sku.clone().unwrap_or_default())
        .bind(&draft.status)
        .bind(draft.stock)
        .bind(&draft.image_url)
        .bind(draft.normalized_images())
        .fetch_one(&mut *tx)
        .await?;

        replace_children(&mut tx, id, &draft).await?;

        let totals = ListingTotals {
            all_products: Some(CountChange::new(products_before, count_all(&mut tx).await?)),
            per_category: pair_counts(categories_before, count_categories(&mut tx, &categories).await?),
        };
        tx.commit().await?;

        tracing::info!(product_id = id, slug = %draft.slug, "product created");
        Ok(CommitReceipt {
            mutation: CatalogMutation::ProductCreated {
                after: ProductSnapshot::new(draft.slug, categories),
                totals,
            },
            product_id: Some(id),
        })
    }

    async fn update_product(&self, id: i64, draft: ProductDraft) -> Result<CommitReceipt, DatabaseError> {
        draft.validate().map_err(DatabaseError::Invalid)?;
        let mut tx = self.pool.begin().await?;

        let (old_slug, old_categories) = lock_product(&mut tx, id).await?;
        let new_categories: BTreeSet<i64> = draft.category_ids().into_iter().collect();
        let touched: BTreeSet<i64> = old_categories.union(&new_categories).copied().collect();

        let products = count_all(&mut tx).await?;
        let categories_before = count_categories(&mut tx, &touched).await?;

        sqlx::query(
            r#"
            UPDATE products
            SET name = $1, slug = $2, short_description = $3, description = $4,
                price = $5::numeric, mrp = $6::numeric, sku = $7, status = $8, stock = $9,
                image_url = $10, images = $11, updated_at = NOW()
            WHERE id = $12
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.slug)
        .bind(&draft.short_description)
        .bind(&draft.description)
        .bind(draft.price)
        .bind(draft.mrp)
        .bind(draft.sku.clone().unwrap_or_default())
        .bind(&draft.status)
        .bind(draft.stock)
        .bind(&draft.image_url)
        .bind(draft.normalized_images())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM product_categories WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM product_variations WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        replace_children(&mut tx, id, &draft).await?;

        let totals = ListingTotals {
            all_products: Some(CountChange::unchanged(products)),
            per_category: pair_counts(categories_before, count_categories(&mut tx, &touched).await?),
        };
        tx.commit().await?;

        tracing::info!(product_id = id, slug = %draft.slug, "product updated");
        Ok(CommitReceipt {
            mutation: CatalogMutation::ProductUpdated {
                before: ProductSnapshot::new(old_slug, old_categories),
                after: ProductSnapshot::new(draft.slug, new_categories),
                totals,
            },
            product_id: Some(id),
        })
    }

    async fn delete_product(&self, id: i64) -> Result<CommitReceipt, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let (slug, categories) = lock_product(&mut tx, id).await?;
        let products_before = count_all(&mut tx).await?;
        let categories_before = count_categories(&mut tx, &categories).await?;

        sqlx::query("DELETE FROM product_variations WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM product_categories WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let totals = ListingTotals {
            all_products: Some(CountChange::new(products_before, count_all(&mut tx).await?)),
            per_category: pair_counts(categories_before, count_categories(&mut tx, &categories).await?),
        };
        tx.commit().await?;

        tracing::info!(product_id = id, slug = %slug, "product deleted");
        Ok(CommitReceipt {
            mutation: CatalogMutation::ProductDeleted {
                before: ProductSnapshot::new(slug, categories),
                totals,
            },
            product_id: Some(id),
        })
    }

    async fn rename_category(&self, id: i64, name: String) -> Result<CommitReceipt, DatabaseError> {
        if name.trim().is_empty() {
            return Err(DatabaseError::Invalid("Category name is required".to_string()));
        }
        let result = sqlx::query("UPDATE categories SET name = $2 WHERE id = $1")
            .bind(id)
            .bind(name.trim())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Category {} not found", id)));
        }
        Ok(CommitReceipt {
            mutation: CatalogMutation::CategoryChanged { category_id: id },
            product_id: None,
        })
    }

    async fn delete_category(&self, id: i64) -> Result<CommitReceipt, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM product_categories WHERE category_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Category {} not found", id)));
        }
        tx.commit().await?;
        Ok(CommitReceipt {
            mutation: CatalogMutation::CategoryChanged { category_id: id },
            product_id: None,
        })
    }
}

/// Lock the product row and read the attributes that decide its cache keys.
async fn lock_product(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<(String, BTreeSet<i64>), DatabaseError> {
    let slug: Option<String> = sqlx::query_scalar("SELECT slug FROM products WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    let slug = slug.ok_or_else(|| DatabaseError::NotFound("Product not found".to_string()))?;

    let categories: Vec<i64> = sqlx::query_scalar("SELECT category_id FROM product_categories WHERE product_id = $1")
        .bind(id)
        .fetch_all(&mut **tx)
        .await?;
    Ok((slug, categories.into_iter().collect()))
}

async fn replace_children(tx: &mut Transaction<'_, Postgres>, id: i64, draft: &ProductDraft) -> Result<(), DatabaseError> {
    let categories = draft.category_ids();
    if !categories.is_empty() {
        sqlx::query("INSERT INTO product_categories (product_id, category_id) SELECT $1, UNNEST($2::bigint[])")
            .bind(id)
            .bind(&categories)
            .execute(&mut **tx)
            .await?;
    }

    for v in &draft.variations {
        sqlx::query(
            r#"
            INSERT INTO product_variations (product_id, variation_name, variation_sku, variation_price, variation_mrp)
            VALUES ($1, $2, $3, $4::numeric, $5::numeric)
            "#,
        )
        .bind(id)
        .bind(&v.variation_name)
        .bind(v.variation_sku.clone().unwrap_or_default())
        .bind(v.variation_price)
        .bind(v.variation_mrp)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn count_all(conn: &mut PgConnection) -> Result<i64, DatabaseError> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM products").fetch_one(conn).await?)
}

async fn count_categories(conn: &mut PgConnection, ids: &BTreeSet<i64>) -> Result<BTreeMap<i64, i64>, DatabaseError> {
    let mut counts = BTreeMap::new();
    for id in ids {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_categories WHERE category_id = $1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        counts.insert(*id, count);
    }
    Ok(counts)
}

fn pair_counts(before: BTreeMap<i64, i64>, after: BTreeMap<i64, i64>) -> BTreeMap<i64, CountChange> {
    before
        .into_iter()
        .map(|(id, b)| (id, CountChange::new(b, after.get(&id).copied().unwrap_or(b))))
        .collect()
}

/// `%query%` with LIKE metacharacters escaped.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn categories(&self, limit: i64) -> Result<Vec<Category>, DatabaseError> {
        Ok(sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY id DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn product_page(
        &self,
        category: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductSummary>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT
                p.id, p.name, p.slug, p.short_description, p.image_url,
                MIN(v.variation_mrp)::float8 AS min_price,
                MAX(v.variation_mrp)::float8 AS max_price,
                {} AS category
            FROM products p
            LEFT JOIN product_variations v ON v.product_id = p.id
            WHERE ($1::bigint IS NULL OR EXISTS (
                SELECT 1 FROM product_categories pc WHERE pc.product_id = p.id AND pc.category_id = $1
            ))
            GROUP BY p.id
            ORDER BY p.id DESC
            LIMIT $2 OFFSET $3
            "#,
            FIRST_CATEGORY_NAME
        );
        Ok(sqlx::query_as::<_, ProductSummary>(&sql)
            .bind(category)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_products(&self, category: Option<i64>) -> Result<i64, DatabaseError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM products p
            WHERE ($1::bigint IS NULL OR EXISTS (
                SELECT 1 FROM product_categories pc WHERE pc.product_id = p.id AND pc.category_id = $1
            ))
            "#,
        )
        .bind(category)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn admin_products(&self) -> Result<Vec<AdminProductRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT
                p.id, p.name, p.slug, p.images,
                LEFT(p.short_description, 50) AS short_description,
                MAX(v.variation_mrp)::float8 AS max_price,
                {} AS category_name
            FROM products p
            LEFT JOIN product_variations v ON v.product_id = p.id
            GROUP BY p.id
            ORDER BY p.id DESC
            "#,
            FIRST_CATEGORY_NAME
        );
        Ok(sqlx::query_as::<_, AdminProductRow>(&sql).fetch_all(&self.pool).await?)
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<ProductDetail>, DatabaseError> {
        let sql = format!("SELECT {} FROM products p WHERE p.slug = $1", PRODUCT_COLUMNS);
        let Some(product) = sqlx::query_as::<_, Product>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT c.id, c.name FROM product_categories pc
            JOIN categories c ON c.id = pc.category_id
            WHERE pc.product_id = $1
            ORDER BY c.id
            "#,
        )
        .bind(product.id)
        .fetch_all(&self.pool)
        .await?;

        let variations = sqlx::query_as::<_, Variation>(
            r#"
            SELECT id, product_id, variation_name, variation_sku,
                   variation_price::float8 AS variation_price,
                   variation_mrp::float8 AS variation_mrp
            FROM product_variations
            WHERE product_id = $1
            ORDER BY id
            "#,
        )
        .bind(product.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ProductDetail {
            product,
            categories: categories.iter().map(|c| c.id).collect(),
            category_names: categories.into_iter().map(|c| c.name).collect(),
            variations,
        }))
    }

    async fn search_products(&self, query: &str, limit: i64) -> Result<Vec<ProductHit>, DatabaseError> {
        Ok(sqlx::query_as::<_, ProductHit>(
            r#"SELECT id, name FROM products WHERE LOWER(name) LIKE $1 ESCAPE '\' ORDER BY id DESC LIMIT $2"#,
        )
        .bind(like_pattern(query))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn cart_lines(&self, items: &[CartItem]) -> Result<Vec<CartLine>, DatabaseError> {
        if items.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let sql = format!("SELECT {} FROM products p WHERE p.id = ANY($1) ORDER BY p.id DESC", PRODUCT_COLUMNS);
        let products = sqlx::query_as::<_, Product>(&sql).bind(&ids).fetch_all(&self.pool).await?;

        Ok(products
            .into_iter()
            .map(|product| {
                let quantity = items
                    .iter()
                    .find(|i| i.id == product.id)
                    .and_then(|i| i.quantity)
                    .filter(|q| *q > 0)
                    .unwrap_or(1);
                CartLine { product, quantity }
            })
            .collect())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, DatabaseError> {
        Ok(sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE slug = $1)")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserCredentials>, DatabaseError> {
        Ok(sqlx::query_as::<_, UserCredentials>(
            "SELECT id, name, email, password, role FROM users WHERE email = $1 LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<OrderSummary>, DatabaseError> {
        let sql = format!("{} ORDER BY o.id DESC LIMIT $1", ORDER_SUMMARY_SELECT);
        Ok(sqlx::query_as::<_, OrderSummary>(&sql).bind(limit).fetch_all(&self.pool).await?)
    }

    async fn order_detail(&self, id: i64) -> Result<Option<OrderDetail>, DatabaseError> {
        let sql = format!("{} WHERE o.id = $1", ORDER_SUMMARY_SELECT);
        let Some(summary) = sqlx::query_as::<_, OrderSummary>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let customer = sqlx::query_as::<_, OrderCustomer>(
            r#"
            SELECT u.email, u.phone, u.address, o.shipping_cost::float8 AS shipping_cost
            FROM orders o
            LEFT JOIN users u ON u.id = o.user_id
            WHERE o.id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        let products = sqlx::query_as::<_, OrderLine>(
            r#"
            SELECT op.id, op.product_id, p.name, p.slug, op.quantity, op.price::float8 AS price
            FROM order_products op
            LEFT JOIN products p ON p.id = op.product_id
            WHERE op.order_id = $1
            ORDER BY op.id DESC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(OrderDetail { summary, customer, products }))
    }

    async fn apply(&self, command: CatalogCommand) -> Result<CommitReceipt, DatabaseError> {
        match command {
            CatalogCommand::CreateProduct(draft) => self.create_product(draft).await,
            CatalogCommand::UpdateProduct { id, draft } => self.update_product(id, draft).await,
            CatalogCommand::DeleteProduct { id } => self.delete_product(id).await,
            CatalogCommand::RenameCategory { id, name } => self.rename_category(id, name).await,
            CatalogCommand::DeleteCategory { id } => self.delete_category(id).await,
        }
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(&self.pool).await
    }
}
