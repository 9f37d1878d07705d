//! Task queue repository.

use crate::error::StoreResult;
use crate::models::{TaskPatch, TaskRow};
use async_trait::async_trait;
use basin_core::task::TaskAction;
use uuid::Uuid;

/// Repository for the durable task queue.
#[async_trait]
pub trait TaskRepo: Send + Sync {
    /// Insert a task with status `pending` and zero retries.
    async fn add_task(
        &self,
        resource_id: &str,
        action: TaskAction,
        metadata: &str,
    ) -> StoreResult<Uuid>;

    /// Atomically pop the oldest-updated pending task: flip it to `started`,
    /// stamp `started = now()`, and return it. None when the queue is idle.
    async fn pop_pending_task(&self) -> StoreResult<Option<TaskRow>>;

    /// Apply a partial update; unset patch fields keep their stored value.
    async fn update_task(&self, id: Uuid, patch: &TaskPatch) -> StoreResult<()>;

    /// Any live pending/started plan- or provider-change task for the
    /// resource.
    async fn is_upgrading(&self, resource_id: &str) -> StoreResult<bool>;

    /// Any live pending/started restore task for the resource.
    async fn is_restoring(&self, resource_id: &str) -> StoreResult<bool>;

    /// Tasks that have been `started` for more than 24 hours.
    async fn count_stale_started_tasks(&self) -> StoreResult<i64>;
}
