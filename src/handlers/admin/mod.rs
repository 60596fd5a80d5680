// handlers/admin/mod.rs - /api/admin/* endpoints
//
// The request pipeline has already verified an admin session; the granted
// identity is available as Extension<AuthUser>.

pub mod categories; // PUT/DELETE /api/admin/categories/:id
pub mod orders; // GET /api/admin/orders[/:id]
pub mod products; // /api/admin/products/*
