//! Catalog repository: services and plans.

use crate::error::StoreResult;
use crate::models::ServiceRow;
use async_trait::async_trait;
use basin_core::plan::Plan;
use uuid::Uuid;

/// Repository for catalog reads.
///
/// Plans come back as resolved domain plans (provider tag parsed,
/// environment interpolation applied); services come back as rows and are
/// shaped into the catalog response by the caller.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// All non-deleted services.
    async fn get_services(&self) -> StoreResult<Vec<ServiceRow>>;

    /// All non-deleted plans of a service, ordered by plan name.
    async fn get_plans(&self, service_id: Uuid) -> StoreResult<Vec<Plan>>;

    /// A single plan by id. None when absent or deleted.
    async fn get_plan(&self, plan_id: Uuid) -> StoreResult<Option<Plan>>;
}
