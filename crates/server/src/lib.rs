//! OSB API surface and background engine for the Basin service broker.
//!
//! This crate provides:
//! - The OSB v2 request handlers (catalog, provision, bind, last-operation,
//!   and the rotate-credentials extension action)
//! - The background task worker with bounded retries
//! - The preprovisioning pool reconciler
//! - Signed webhook delivery

pub mod error;
pub mod handlers;
pub mod osb;
pub mod resolve;
pub mod routes;
pub mod state;
pub mod tasks;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
