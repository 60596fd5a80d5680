// handlers/public/mod.rs - storefront and session endpoints under /api
//
// Rate limited by the request pipeline; no session required.

pub mod auth; // POST /api/auth, POST /api/auth/logout, GET /api/auth/whoami
pub mod catalog; // GET /api/categories, /api/products/*
