pub mod identity;
pub mod pipeline;
pub mod response;
pub mod route;

pub use crate::auth::AuthUser;
pub use identity::ClientIdentity;
pub use pipeline::request_pipeline;
pub use response::{ApiResponse, ApiResult};
pub use route::{RouteClass, Surface};
