// handlers/mod.rs - handler tiers
//
// Public (no auth) -> storefront API (rate limited) -> admin (rate limited + admin role).
// The tiers are enforced by middleware::request_pipeline from the path prefix,
// so a handler's module only documents which tier it lives in.

pub mod admin; // Tier 3: /api/admin/* (admin session required)
pub mod public; // Tier 2: /api/* storefront + session endpoints
pub mod system; // Tier 1: /, /health, fallback
