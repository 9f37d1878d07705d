//! PostgreSQL-based broker store implementation.

use crate::error::{StoreError, StoreResult};
use crate::models::{InstanceEntry, PlanRow, PoolEntry, ServiceRow, TaskPatch, TaskRow};
use crate::repos::{CatalogRepo, InstanceRepo, TaskRepo};
use crate::store::BrokerStore;
use async_trait::async_trait;
use basin_core::instance::{Instance, User};
use basin_core::plan::Plan;
use basin_core::task::TaskAction;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

/// PostgreSQL schema (embedded). A single idempotent `do` block: types,
/// tables, update triggers, forward column migrations, and catalog seeding.
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

const PLAN_COLUMNS: &str = r#"
    plans.plan,
    plans.service,
    services.name::text as service_name,
    plans.name::text as name,
    plans.human_name,
    plans.description,
    plans.version,
    plans.type::text as "type",
    plans.scheme::text as scheme,
    plans.categories,
    plans.cost_cents::int as cost_cents,
    plans.cost_unit::text as cost_unit,
    plans.attributes::text as attributes,
    plans.provider,
    plans.provider_private_details::text as provider_private_details,
    plans.installable_inside_private_network,
    plans.installable_outside_private_network,
    plans.supports_multiple_installations,
    plans.supports_sharing,
    plans.preprovision,
    plans.beta,
    plans.deprecated,
    plans.created,
    plans.updated
"#;

const TASK_COLUMNS: &str =
    "task, resource, action, status::text as status, retries, metadata, result, \
     created, updated, started, finished, deleted";

/// PostgreSQL-based broker store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect to the database and run the self-initialising schema.
    pub async fn from_url(url: &str, max_connections: u32) -> StoreResult<Self> {
        if url.is_empty() {
            return Err(StoreError::Config(
                "no database URL configured".to_string(),
            ));
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    fn plans_query(filter: &str) -> String {
        format!(
            "select {PLAN_COLUMNS} from plans join services on services.service = plans.service \
             where services.deleted = false and plans.deleted = false {filter}"
        )
    }
}

#[async_trait]
impl CatalogRepo for PostgresStore {
    async fn get_services(&self) -> StoreResult<Vec<ServiceRow>> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            "select service, name::text as name, human_name, description, categories, image, \
             beta, deprecated, created, updated from services where deleted = false",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_plans(&self, service_id: Uuid) -> StoreResult<Vec<Plan>> {
        let rows = sqlx::query_as::<_, PlanRow>(&Self::plans_query(
            "and plans.service = $1 order by plans.name",
        ))
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PlanRow::into_plan).collect())
    }

    async fn get_plan(&self, plan_id: Uuid) -> StoreResult<Option<Plan>> {
        let row = sqlx::query_as::<_, PlanRow>(&Self::plans_query("and plans.plan = $1"))
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(PlanRow::into_plan))
    }
}

#[async_trait]
impl InstanceRepo for PostgresStore {
    async fn get_instance(&self, id: &str) -> StoreResult<Option<InstanceEntry>> {
        let row = sqlx::query_as::<_, InstanceEntry>(
            "select id, name, plan, claimed, status, username, password, endpoint, \
             (select count(*) from tasks where tasks.resource = resources.id \
              and tasks.status = 'started' and tasks.deleted = false) as started_tasks \
             from resources where id = $1 and deleted = false",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn add_instance(&self, instance: &Instance) -> StoreResult<()> {
        sqlx::query(
            "insert into resources (id, name, plan, claimed, status, username, password, endpoint) \
             values ($1, $2, $3, true, $4, $5, $6, $7)",
        )
        .bind(&instance.id)
        .bind(&instance.name)
        .bind(instance.plan.id)
        .bind(&instance.status)
        .bind(&instance.username)
        .bind(&instance.password)
        .bind(&instance.endpoint)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_instance(&self, instance: &Instance, plan_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "update resources set plan = $1, endpoint = $2, status = $3, username = $4, \
             password = $5, name = $6 where id = $7",
        )
        .bind(plan_id)
        .bind(&instance.endpoint)
        .bind(&instance.status)
        .bind(&instance.username)
        .bind(&instance.password)
        .bind(&instance.name)
        .bind(&instance.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_credentials(&self, instance: &Instance, user: &User) -> StoreResult<()> {
        sqlx::query("update resources set username = $1, password = $2 where id = $3")
            .bind(&user.access_key_id)
            .bind(&user.secret_access_key)
            .bind(&instance.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn nuke_instance(&self, id: &str) -> StoreResult<()> {
        sqlx::query("delete from resources where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_instance(&self, id: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("update tasks set deleted = true where resource = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("update resources set deleted = true where id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn instance_id_in_use(&self, id: &str) -> StoreResult<bool> {
        // No deleted filter: ids are burned forever once used.
        let count: i64 = sqlx::query_scalar("select count(*) from resources where id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count != 0)
    }

    async fn get_unclaimed_instance(
        &self,
        plan_id: Uuid,
        new_instance_id: &str,
    ) -> StoreResult<Option<InstanceEntry>> {
        let mut tx = self.pool.begin().await?;

        let pooled = sqlx::query_as::<_, InstanceEntry>(
            "select id, name, plan, claimed, status, username, password, endpoint, \
             0::int8 as started_tasks from resources \
             where claimed = false and status = 'available' and deleted = false \
             and id != $1 and plan = $2 limit 1",
        )
        .bind(new_instance_id)
        .bind(plan_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut entry) = pooled else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "insert into resources (id, name, plan, claimed, status, username, password, endpoint) \
             values ($1, $2, $3, true, $4, $5, $6, $7)",
        )
        .bind(new_instance_id)
        .bind(&entry.name)
        .bind(entry.plan)
        .bind(&entry.status)
        .bind(&entry.username)
        .bind(&entry.password)
        .bind(&entry.endpoint)
        .execute(&mut *tx)
        .await?;

        sqlx::query("update tasks set resource = $2 where resource = $1 and deleted = false")
            .bind(&entry.id)
            .bind(new_instance_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("delete from resources where id = $1 and deleted = false and claimed = false")
            .bind(&entry.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        entry.id = new_instance_id.to_string();
        entry.claimed = true;
        Ok(Some(entry))
    }

    async fn return_claimed_instance(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "update resources set claimed = false, id = uuid_generate_v4()::varchar(1024) \
             where id = $1 and status = 'available' and deleted = false and claimed = true",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Internal(format!(
                "invalid row count returned while trying to return claimed instance {id}"
            )));
        }
        Ok(())
    }

    async fn start_provisioning_tasks(&self) -> StoreResult<Vec<PoolEntry>> {
        let shortfalls = sqlx::query(
            "select \
                plans.plan, \
                plans.preprovision - ( \
                    select count(*) from resources \
                    where resources.claimed = false \
                    and (resources.status = 'available' or resources.status = 'creating' \
                         or resources.status = 'provisioning' or resources.status = 'backing-up' \
                         or resources.status = 'starting') \
                    and resources.deleted = false and plan = plans.plan \
                ) as needed \
             from plans join services on plans.service = services.service \
             where plans.deprecated = false and plans.deleted = false \
             and services.deleted = false and services.deprecated = false",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::new();
        for row in shortfalls {
            let plan_id: Uuid = row.try_get("plan")?;
            let needed: i64 = row.try_get("needed")?;
            for _ in 0..needed.max(0) {
                let inserted = sqlx::query_scalar::<_, String>(
                    "insert into resources (id, name, plan, claimed, status, username, password, endpoint) \
                     values (uuid_generate_v4()::varchar(1024), '', $1, false, 'provisioning', '', '', '') \
                     returning id",
                )
                .bind(plan_id)
                .fetch_one(&self.pool)
                .await;
                match inserted {
                    Ok(id) => entries.push(PoolEntry { id, plan: plan_id }),
                    Err(e) => {
                        tracing::warn!(plan_id = %plan_id, error = %e,
                            "unable to insert resource entry for preprovisioning");
                    }
                }
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl TaskRepo for PostgresStore {
    async fn add_task(
        &self,
        resource_id: &str,
        action: TaskAction,
        metadata: &str,
    ) -> StoreResult<Uuid> {
        let task_id: Uuid = sqlx::query_scalar(
            "insert into tasks (task, resource, action, metadata) \
             values (uuid_generate_v4(), $1, $2, $3) returning task",
        )
        .bind(resource_id)
        .bind(action.as_str())
        .bind(metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(task_id)
    }

    async fn pop_pending_task(&self) -> StoreResult<Option<TaskRow>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "update tasks set status = 'started', started = now() \
             where task in (select task from tasks where status = 'pending' \
                            and deleted = false order by updated asc limit 1) \
             returning {TASK_COLUMNS}"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_task(&self, id: Uuid, patch: &TaskPatch) -> StoreResult<()> {
        sqlx::query(
            "update tasks set \
                status = coalesce($2::task_status, status), \
                retries = coalesce($3, retries), \
                metadata = coalesce($4, metadata), \
                result = coalesce($5, result), \
                started = coalesce($6, started), \
                finished = coalesce($7, finished) \
             where task = $1",
        )
        .bind(id)
        .bind(patch.status.as_deref())
        .bind(patch.retries)
        .bind(patch.metadata.as_deref())
        .bind(patch.result.as_deref())
        .bind(patch.started)
        .bind(patch.finished)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_upgrading(&self, resource_id: &str) -> StoreResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "select count(*) from tasks where (status = 'started' or status = 'pending') \
             and (action = 'change-providers' or action = 'change-plans') \
             and deleted = false and resource = $1",
        )
        .bind(resource_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn is_restoring(&self, resource_id: &str) -> StoreResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "select count(*) from tasks where (status = 'started' or status = 'pending') \
             and action = 'restore-database' and deleted = false and resource = $1",
        )
        .bind(resource_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn count_stale_started_tasks(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "select count(*) from tasks where status = 'started' \
             and started < now() - interval '24 hours' and deleted = false",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl BrokerStore for PostgresStore {
    async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(POSTGRES_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i32>("select 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
