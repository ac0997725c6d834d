//! HTTP API module.
//!
//! Provides the REST endpoints for user and role management.

mod docs;
mod error;
mod handlers;
mod routes;
mod state;

pub use docs::ApiDoc;
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
