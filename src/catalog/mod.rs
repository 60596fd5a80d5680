//! Catalog data access wrapped in the cache: reads go through
//! [`CatalogReadPath`], writes through [`CatalogWritePath`], and
//! [`CatalogService`] names the operations the handlers call.

pub mod read;
pub mod service;
pub mod write;

use std::sync::Arc;
use thiserror::Error;

use crate::database::DatabaseError;

pub use read::{CatalogReadPath, Fetched};
pub use service::{CatalogService, ListingPage, SlugCheck};
pub use write::{CatalogWritePath, PurgeReport};

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// A store call failed or timed out; shared between waiters of one load.
    #[error(transparent)]
    Database(Arc<DatabaseError>),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),
}

impl From<DatabaseError> for CatalogError {
    fn from(err: DatabaseError) -> Self {
        CatalogError::Database(Arc::new(err))
    }
}

impl From<Arc<DatabaseError>> for CatalogError {
    fn from(err: Arc<DatabaseError>) -> Self {
        CatalogError::Database(err)
    }
}
