//! In-memory BrokerStore used by the integration tests.
//!
//! Mirrors the Postgres store's observable semantics: soft deletes, the
//! atomic pool claim, oldest-updated-first task popping, and the
//! updated-timestamp bump on every task update.

use async_trait::async_trait;
use basin_core::instance::{Instance, User};
use basin_core::plan::Plan;
use basin_core::task::TaskAction;
use basin_store::error::{StoreError, StoreResult};
use basin_store::models::{InstanceEntry, PoolEntry, ServiceRow, TaskPatch, TaskRow};
use basin_store::repos::{CatalogRepo, InstanceRepo, TaskRepo};
use basin_store::BrokerStore;
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

/// A resource row.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub id: String,
    pub name: String,
    pub plan: Uuid,
    pub claimed: bool,
    pub status: String,
    pub username: String,
    pub password: String,
    pub endpoint: String,
    pub deleted: bool,
}

#[derive(Default)]
struct Inner {
    services: Vec<ServiceRow>,
    plans: Vec<Plan>,
    resources: Vec<ResourceRecord>,
    tasks: Vec<TaskRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_service(&self, service: ServiceRow) {
        self.inner.lock().unwrap().services.push(service);
    }

    pub fn seed_plan(&self, plan: Plan) {
        self.inner.lock().unwrap().plans.push(plan);
    }

    pub fn seed_resource(&self, resource: ResourceRecord) {
        self.inner.lock().unwrap().resources.push(resource);
    }

    pub fn resources(&self) -> Vec<ResourceRecord> {
        self.inner.lock().unwrap().resources.clone()
    }

    pub fn resource(&self, id: &str) -> Option<ResourceRecord> {
        self.inner
            .lock()
            .unwrap()
            .resources
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn tasks(&self) -> Vec<TaskRow> {
        self.inner.lock().unwrap().tasks.clone()
    }

    pub fn task(&self, id: Uuid) -> Option<TaskRow> {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .iter()
            .find(|t| t.task == id)
            .cloned()
    }

    pub fn set_task_retries(&self, id: Uuid, retries: i32) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.iter_mut().find(|t| t.task == id) {
            task.retries = retries;
        }
    }
}

#[async_trait]
impl CatalogRepo for MemoryStore {
    async fn get_services(&self) -> StoreResult<Vec<ServiceRow>> {
        Ok(self.inner.lock().unwrap().services.clone())
    }

    async fn get_plans(&self, service_id: Uuid) -> StoreResult<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .inner
            .lock()
            .unwrap()
            .plans
            .iter()
            .filter(|p| p.service_id == service_id)
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    async fn get_plan(&self, plan_id: Uuid) -> StoreResult<Option<Plan>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .plans
            .iter()
            .find(|p| p.id == plan_id)
            .cloned())
    }
}

#[async_trait]
impl InstanceRepo for MemoryStore {
    async fn get_instance(&self, id: &str) -> StoreResult<Option<InstanceEntry>> {
        let inner = self.inner.lock().unwrap();
        let Some(resource) = inner.resources.iter().find(|r| r.id == id && !r.deleted) else {
            return Ok(None);
        };
        let started_tasks = inner
            .tasks
            .iter()
            .filter(|t| t.resource == id && t.status == "started" && !t.deleted)
            .count() as i64;
        Ok(Some(InstanceEntry {
            id: resource.id.clone(),
            name: resource.name.clone(),
            plan: resource.plan,
            claimed: resource.claimed,
            status: resource.status.clone(),
            username: resource.username.clone(),
            password: resource.password.clone(),
            endpoint: resource.endpoint.clone(),
            started_tasks,
        }))
    }

    async fn add_instance(&self, instance: &Instance) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.resources.iter().any(|r| r.id == instance.id) {
            return Err(StoreError::Conflict(format!(
                "resource {} already exists",
                instance.id
            )));
        }
        inner.resources.push(ResourceRecord {
            id: instance.id.clone(),
            name: instance.name.clone(),
            plan: instance.plan.id,
            claimed: true,
            status: instance.status.clone(),
            username: instance.username.clone(),
            password: instance.password.clone(),
            endpoint: instance.endpoint.clone(),
            deleted: false,
        });
        Ok(())
    }

    async fn update_instance(&self, instance: &Instance, plan_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(resource) = inner.resources.iter_mut().find(|r| r.id == instance.id) {
            resource.plan = plan_id;
            resource.endpoint = instance.endpoint.clone();
            resource.status = instance.status.clone();
            resource.username = instance.username.clone();
            resource.password = instance.password.clone();
            resource.name = instance.name.clone();
        }
        Ok(())
    }

    async fn update_credentials(&self, instance: &Instance, user: &User) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(resource) = inner.resources.iter_mut().find(|r| r.id == instance.id) {
            resource.username = user.access_key_id.clone();
            resource.password = user.secret_access_key.clone();
        }
        Ok(())
    }

    async fn nuke_instance(&self, id: &str) -> StoreResult<()> {
        self.inner.lock().unwrap().resources.retain(|r| r.id != id);
        Ok(())
    }

    async fn delete_instance(&self, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for task in inner.tasks.iter_mut().filter(|t| t.resource == id) {
            task.deleted = true;
        }
        if let Some(resource) = inner.resources.iter_mut().find(|r| r.id == id) {
            resource.deleted = true;
        }
        Ok(())
    }

    async fn instance_id_in_use(&self, id: &str) -> StoreResult<bool> {
        Ok(self.inner.lock().unwrap().resources.iter().any(|r| r.id == id))
    }

    async fn get_unclaimed_instance(
        &self,
        plan_id: Uuid,
        new_instance_id: &str,
    ) -> StoreResult<Option<InstanceEntry>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(index) = inner.resources.iter().position(|r| {
            !r.claimed
                && r.status == "available"
                && !r.deleted
                && r.id != new_instance_id
                && r.plan == plan_id
        }) else {
            return Ok(None);
        };

        let pooled = inner.resources.remove(index);
        inner.resources.push(ResourceRecord {
            id: new_instance_id.to_string(),
            claimed: true,
            ..pooled.clone()
        });
        for task in inner
            .tasks
            .iter_mut()
            .filter(|t| t.resource == pooled.id && !t.deleted)
        {
            task.resource = new_instance_id.to_string();
        }

        Ok(Some(InstanceEntry {
            id: new_instance_id.to_string(),
            name: pooled.name,
            plan: pooled.plan,
            claimed: true,
            status: pooled.status,
            username: pooled.username,
            password: pooled.password,
            endpoint: pooled.endpoint,
            started_tasks: 0,
        }))
    }

    async fn return_claimed_instance(&self, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(resource) = inner
            .resources
            .iter_mut()
            .find(|r| r.id == id && r.claimed && r.status == "available" && !r.deleted)
        else {
            return Err(StoreError::Internal(format!(
                "invalid row count returned while trying to return claimed instance {id}"
            )));
        };
        resource.claimed = false;
        resource.id = Uuid::new_v4().to_string();
        Ok(())
    }

    async fn start_provisioning_tasks(&self) -> StoreResult<Vec<PoolEntry>> {
        let mut inner = self.inner.lock().unwrap();
        let plans: Vec<(Uuid, i32)> = inner
            .plans
            .iter()
            .filter(|p| !p.deprecated)
            .map(|p| (p.id, p.preprovision))
            .collect();

        let mut entries = Vec::new();
        for (plan_id, preprovision) in plans {
            let pooled = inner
                .resources
                .iter()
                .filter(|r| {
                    !r.claimed
                        && !r.deleted
                        && r.plan == plan_id
                        && matches!(
                            r.status.as_str(),
                            "available" | "creating" | "provisioning" | "backing-up" | "starting"
                        )
                })
                .count() as i32;
            for _ in 0..(preprovision - pooled).max(0) {
                let id = Uuid::new_v4().to_string();
                inner.resources.push(ResourceRecord {
                    id: id.clone(),
                    name: String::new(),
                    plan: plan_id,
                    claimed: false,
                    status: "provisioning".to_string(),
                    username: String::new(),
                    password: String::new(),
                    endpoint: String::new(),
                    deleted: false,
                });
                entries.push(PoolEntry { id, plan: plan_id });
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl TaskRepo for MemoryStore {
    async fn add_task(
        &self,
        resource_id: &str,
        action: TaskAction,
        metadata: &str,
    ) -> StoreResult<Uuid> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.resources.iter().any(|r| r.id == resource_id) {
            return Err(StoreError::Conflict(format!(
                "task references unknown resource {resource_id}"
            )));
        }
        let task_id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        inner.tasks.push(TaskRow {
            task: task_id,
            resource: resource_id.to_string(),
            action: action.as_str().to_string(),
            status: "pending".to_string(),
            retries: 0,
            metadata: metadata.to_string(),
            result: String::new(),
            created: now,
            updated: now,
            started: None,
            finished: None,
            deleted: false,
        });
        Ok(task_id)
    }

    async fn pop_pending_task(&self) -> StoreResult<Option<TaskRow>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(task) = inner
            .tasks
            .iter_mut()
            .filter(|t| t.status == "pending" && !t.deleted)
            .min_by_key(|t| t.updated)
        else {
            return Ok(None);
        };
        task.status = "started".to_string();
        task.started = Some(OffsetDateTime::now_utc());
        Ok(Some(task.clone()))
    }

    async fn update_task(&self, id: Uuid, patch: &TaskPatch) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.iter_mut().find(|t| t.task == id) {
            if let Some(status) = &patch.status {
                task.status = status.clone();
            }
            if let Some(retries) = patch.retries {
                task.retries = retries;
            }
            if let Some(metadata) = &patch.metadata {
                task.metadata = metadata.clone();
            }
            if let Some(result) = &patch.result {
                task.result = result.clone();
            }
            if let Some(started) = patch.started {
                task.started = Some(started);
            }
            if let Some(finished) = patch.finished {
                task.finished = Some(finished);
            }
            // The Postgres trigger bumps `updated` on every write; retry
            // ordering relies on it.
            task.updated = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn is_upgrading(&self, resource_id: &str) -> StoreResult<bool> {
        Ok(self.inner.lock().unwrap().tasks.iter().any(|t| {
            t.resource == resource_id
                && !t.deleted
                && (t.status == "started" || t.status == "pending")
                && (t.action == "change-plans" || t.action == "change-providers")
        }))
    }

    async fn is_restoring(&self, resource_id: &str) -> StoreResult<bool> {
        Ok(self.inner.lock().unwrap().tasks.iter().any(|t| {
            t.resource == resource_id
                && !t.deleted
                && (t.status == "started" || t.status == "pending")
                && t.action == "restore-database"
        }))
    }

    async fn count_stale_started_tasks(&self) -> StoreResult<i64> {
        let cutoff = OffsetDateTime::now_utc() - time::Duration::hours(24);
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tasks
            .iter()
            .filter(|t| {
                t.status == "started" && !t.deleted && t.started.is_some_and(|s| s < cutoff)
            })
            .count() as i64)
    }
}

#[async_trait]
impl BrokerStore for MemoryStore {
    async fn migrate(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
