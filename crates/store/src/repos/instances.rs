//! Resource (instance) repository.

use crate::error::StoreResult;
use crate::models::{InstanceEntry, PoolEntry};
use async_trait::async_trait;
use basin_core::instance::{Instance, User};
use uuid::Uuid;

/// Repository for provisioned and pooled resources.
#[async_trait]
pub trait InstanceRepo: Send + Sync {
    /// Get a non-deleted resource by id, with its started-task count.
    async fn get_instance(&self, id: &str) -> StoreResult<Option<InstanceEntry>>;

    /// Insert a new claimed resource row.
    async fn add_instance(&self, instance: &Instance) -> StoreResult<()>;

    /// Update plan, endpoint, status, credentials, and name for the id.
    async fn update_instance(&self, instance: &Instance, plan_id: Uuid) -> StoreResult<()>;

    /// Update username/password only.
    async fn update_credentials(&self, instance: &Instance, user: &User) -> StoreResult<()>;

    /// Hard-delete a row. Compensating action only: used when a provisional
    /// row was inserted but its cloud-side counterpart never materialised.
    async fn nuke_instance(&self, id: &str) -> StoreResult<()>;

    /// Soft-delete a resource and all of its outstanding tasks.
    async fn delete_instance(&self, id: &str) -> StoreResult<()>;

    /// Whether any row, soft-deleted included, carries this id. Instance ids
    /// are never reusable, even historically.
    async fn instance_id_in_use(&self, id: &str) -> StoreResult<bool>;

    /// Atomically claim a pooled resource for `new_instance_id`: copy the
    /// pooled row's bucket identity under the new id, reparent its live
    /// tasks, and delete the pooled row, all in one transaction. None when
    /// the pool has no candidate for the plan.
    async fn get_unclaimed_instance(
        &self,
        plan_id: Uuid,
        new_instance_id: &str,
    ) -> StoreResult<Option<InstanceEntry>>;

    /// Inverse of a claim: un-claim the row and regenerate its id. Used when
    /// a claim committed but a follow-up provider call failed.
    async fn return_claimed_instance(&self, id: &str) -> StoreResult<()>;

    /// For every live plan short of its preprovision target, insert the
    /// missing pool rows (status `provisioning`, empty credentials) and
    /// return them.
    async fn start_provisioning_tasks(&self) -> StoreResult<Vec<PoolEntry>>;
}
