//! Combined broker store trait.

use crate::error::StoreResult;
use crate::repos::{CatalogRepo, InstanceRepo, TaskRepo};
use async_trait::async_trait;

/// The full storage contract the broker runs against.
///
/// Storage is the single source of truth and the only state shared between
/// the request handlers, the task worker, and the preprovisioning loop.
#[async_trait]
pub trait BrokerStore: CatalogRepo + InstanceRepo + TaskRepo + Send + Sync {
    /// Idempotently create the schema and seed the default catalog.
    async fn migrate(&self) -> StoreResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> StoreResult<()>;
}
