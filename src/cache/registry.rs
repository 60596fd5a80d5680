//! Maps catalog mutations to the exact set of derived cache keys they stale.
//!
//! The plan is computed eagerly from entity attributes captured inside the
//! mutating transaction (slug, category membership, listing counts before and
//! after). When a listing's page range is unknown the plan falls back to a
//! prefix sweep: purging too much costs a recompute, purging too little
//! serves stale data until the TTL runs out.

use std::collections::{BTreeMap, BTreeSet};

use super::keys::{CacheKey, PAGE_PREFIX, PRODUCT_PREFIX};

/// Product attributes that decide which keys it appears under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub slug: String,
    pub categories: BTreeSet<i64>,
}

impl ProductSnapshot {
    pub fn new(slug: impl Into<String>, categories: impl IntoIterator<Item = i64>) -> Self {
        Self {
            slug: slug.into(),
            categories: categories.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountChange {
    pub before: i64,
    pub after: i64,
}

impl CountChange {
    pub fn new(before: i64, after: i64) -> Self {
        Self { before, after }
    }

    pub fn unchanged(count: i64) -> Self {
        Self::new(count, count)
    }

    fn larger(&self) -> i64 {
        self.before.max(self.after)
    }
}

/// Listing sizes observed inside the mutating transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingTotals {
    pub all_products: Option<CountChange>,
    pub per_category: BTreeMap<i64, CountChange>,
}

/// A committed change to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogMutation {
    ProductCreated {
        after: ProductSnapshot,
        totals: ListingTotals,
    },
    ProductUpdated {
        before: ProductSnapshot,
        after: ProductSnapshot,
        totals: ListingTotals,
    },
    ProductDeleted {
        before: ProductSnapshot,
        totals: ListingTotals,
    },
    /// Category renamed or deleted.
    CategoryChanged { category_id: i64 },
}

/// Keys to delete and prefixes to sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgePlan {
    pub keys: BTreeSet<String>,
    pub prefixes: BTreeSet<String>,
}

impl PurgePlan {
    fn key(&mut self, key: CacheKey) {
        self.keys.insert(key.to_string());
    }

    fn prefix(&mut self, prefix: impl Into<String>) {
        self.prefixes.insert(prefix.into());
    }

    /// Whether executing this plan removes `key`.
    pub fn covers(&self, key: &str) -> bool {
        self.keys.contains(key) || self.prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.prefixes.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheKeyRegistry {
    page_size: u32,
}

impl CacheKeyRegistry {
    pub fn new(page_size: u32) -> Self {
        Self { page_size: page_size.max(1) }
    }

    /// Number of listing pages for `count` rows; an empty listing still has page 1.
    pub fn page_count(&self, count: i64) -> u32 {
        let size = i64::from(self.page_size);
        let pages = (count.max(0) + size - 1) / size;
        pages.max(1) as u32
    }

    pub fn keys_affected_by(&self, mutation: &CatalogMutation) -> PurgePlan {
        let mut plan = PurgePlan::default();

        match mutation {
            CatalogMutation::ProductCreated { after, totals } => {
                self.product_keys(&mut plan, None, Some(after), totals);
            }
            CatalogMutation::ProductUpdated { before, after, totals } => {
                self.product_keys(&mut plan, Some(before), Some(after), totals);
            }
            CatalogMutation::ProductDeleted { before, totals } => {
                self.product_keys(&mut plan, Some(before), None, totals);
            }
            CatalogMutation::CategoryChanged { category_id } => {
                plan.key(CacheKey::Categories);
                plan.prefix(CacheKey::category_page_prefix(*category_id));
                // Listing, featured, admin and detail payloads embed category names.
                plan.key(CacheKey::FeaturedProducts);
                plan.key(CacheKey::AdminProducts);
                plan.prefix(PAGE_PREFIX);
                plan.prefix(PRODUCT_PREFIX);
            }
        }

        plan
    }

    fn product_keys(
        &self,
        plan: &mut PurgePlan,
        before: Option<&ProductSnapshot>,
        after: Option<&ProductSnapshot>,
        totals: &ListingTotals,
    ) {
        for snapshot in before.iter().chain(after.iter()) {
            plan.key(CacheKey::product(snapshot.slug.clone()));
        }

        plan.key(CacheKey::FeaturedProducts);
        plan.key(CacheKey::AdminProducts);

        let old_categories = before.map(|s| s.categories.clone()).unwrap_or_default();
        let new_categories = after.map(|s| s.categories.clone()).unwrap_or_default();
        if old_categories != new_categories {
            plan.key(CacheKey::Categories);
        }

        match totals.all_products {
            Some(count) => {
                for page in 1..=self.page_count(count.larger()) {
                    plan.key(CacheKey::page(page));
                }
            }
            None => plan.prefix(PAGE_PREFIX),
        }

        for category_id in old_categories.union(&new_categories) {
            match totals.per_category.get(category_id) {
                Some(count) => {
                    for page in 1..=self.page_count(count.larger()) {
                        plan.key(CacheKey::category_page(*category_id, page));
                    }
                }
                None => plan.prefix(CacheKey::category_page_prefix(*category_id)),
            }
        }
    }
}
