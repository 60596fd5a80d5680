use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// One row of a storefront listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub short_description: Option<String>,
    pub image_url: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub category: Option<String>,
}

/// One row of the admin product table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdminProductRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub images: Option<Value>,
    pub short_description: Option<String>,
    pub max_price: Option<f64>,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub mrp: Option<f64>,
    pub sku: Option<String>,
    pub status: Option<String>,
    pub stock: i32,
    pub image_url: Option<String>,
    pub images: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Variation {
    pub id: i64,
    pub product_id: i64,
    pub variation_name: Option<String>,
    pub variation_sku: Option<String>,
    pub variation_price: f64,
    pub variation_mrp: f64,
}

/// Product page payload: the product, its variations and category names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub categories: Vec<i64>,
    pub category_names: Vec<String>,
    pub variations: Vec<Variation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProductHit {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub product: Product,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CartItem {
    pub id: i64,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// PHC-format password hash
    pub password: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderSummary {
    pub id: i64,
    pub total_value: Option<f64>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub shipping_method: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderCustomer {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub shipping_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderLine {
    pub id: i64,
    pub product_id: Option<i64>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub quantity: i32,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub summary: OrderSummary,
    #[serde(flatten)]
    pub customer: OrderCustomer,
    pub products: Vec<OrderLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationDraft {
    pub variation_name: Option<String>,
    #[serde(default)]
    pub variation_sku: Option<String>,
    #[serde(default)]
    pub variation_price: f64,
    #[serde(default)]
    pub variation_mrp: f64,
}

/// Admin product form payload, for both create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub mrp: Option<f64>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub images: Vec<Value>,
    #[serde(default)]
    pub categories: Vec<i64>,
    #[serde(default)]
    pub variations: Vec<VariationDraft>,
}

impl ProductDraft {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Product name is required".to_string());
        }
        if !is_valid_slug(&self.slug) {
            return Err(format!("Invalid slug '{}': use lowercase letters, digits and '-'", self.slug));
        }
        if self.stock < 0 {
            return Err("Stock cannot be negative".to_string());
        }
        Ok(())
    }

    /// Keep only string or object image entries.
    pub fn normalized_images(&self) -> Value {
        Value::Array(
            self.images
                .iter()
                .filter(|v| v.is_string() || v.is_object())
                .cloned()
                .collect(),
        )
    }

    /// Category ids, deduplicated and sorted.
    pub fn category_ids(&self) -> Vec<i64> {
        let mut ids = self.categories.clone();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 200
        && !slug.starts_with('-')
        && slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
