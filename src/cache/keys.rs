use std::fmt;

/// Cache key taxonomy. The rendered strings are shared with existing cache
/// contents and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    Categories,
    FeaturedProducts,
    AdminProducts,
    Product { slug: String },
    Page { page: u32 },
    CategoryPage { category_id: i64, page: u32 },
}

/// Key shapes, used to pick a TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    Aggregate,
    Entity,
    Listing,
}

pub const PAGE_PREFIX: &str = "page:";
pub const PRODUCT_PREFIX: &str = "product:";

/// Prefixes covering every non-aggregate key.
pub const DERIVED_PREFIXES: [&str; 3] = [PAGE_PREFIX, "category:", PRODUCT_PREFIX];

impl CacheKey {
    pub fn product(slug: impl Into<String>) -> Self {
        CacheKey::Product { slug: slug.into() }
    }

    pub fn page(page: u32) -> Self {
        CacheKey::Page { page }
    }

    pub fn category_page(category_id: i64, page: u32) -> Self {
        CacheKey::CategoryPage { category_id, page }
    }

    pub fn shape(&self) -> KeyShape {
        match self {
            CacheKey::Categories | CacheKey::FeaturedProducts | CacheKey::AdminProducts => KeyShape::Aggregate,
            CacheKey::Product { .. } => KeyShape::Entity,
            CacheKey::Page { .. } | CacheKey::CategoryPage { .. } => KeyShape::Listing,
        }
    }

    /// Prefix matching every page key of one category.
    pub fn category_page_prefix(category_id: i64) -> String {
        format!("category:{}:page:", category_id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Categories => f.write_str("categories"),
            CacheKey::FeaturedProducts => f.write_str("featuredProducts"),
            CacheKey::AdminProducts => f.write_str("adminProducts"),
            CacheKey::Product { slug } => write!(f, "{}{}", PRODUCT_PREFIX, slug),
            CacheKey::Page { page } => write!(f, "{}{}", PAGE_PREFIX, page),
            CacheKey::CategoryPage { category_id, page } => write!(f, "category:{}:page:{}", category_id, page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_exact_taxonomy() {
        assert_eq!(CacheKey::Categories.to_string(), "categories");
        assert_eq!(CacheKey::FeaturedProducts.to_string(), "featuredProducts");
        assert_eq!(CacheKey::AdminProducts.to_string(), "adminProducts");
        assert_eq!(CacheKey::product("vitamin-c").to_string(), "product:vitamin-c");
        assert_eq!(CacheKey::page(1).to_string(), "page:1");
        assert_eq!(CacheKey::category_page(7, 3).to_string(), "category:7:page:3");
    }

    #[test]
    fn category_prefix_does_not_match_other_categories() {
        let prefix = CacheKey::category_page_prefix(7);
        assert!(CacheKey::category_page(7, 12).to_string().starts_with(&prefix));
        assert!(!CacheKey::category_page(70, 1).to_string().starts_with(&prefix));
    }
}
