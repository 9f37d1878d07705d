//! Background task worker.
//!
//! A single cooperative consumer over the durable task queue. Only one
//! worker process is supported: the pop is transactionally safe, but the
//! oldest-updated-first ordering assumes a single drainer. Dispatch never
//! propagates errors upward; every failure becomes a retry with a
//! human-readable result, bounded by the per-action cap.

use crate::resolve::resolve_instance;
use crate::state::AppState;
use crate::tasks::webhook::{is_delivered, WebhookClient, WebhookPayload};
use basin_core::instance::Instance;
use basin_core::task::{
    ChangePlansTaskMetadata, ChangeProvidersTaskMetadata, TaskAction, TaskStatus,
    WebhookTaskMetadata,
};
use basin_provider::ProviderError;
use basin_store::models::{TaskPatch, TaskRow};
use basin_store::repos::{CatalogRepo, InstanceRepo, TaskRepo};
use basin_store::StoreError;
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Delete gives up sooner than the resync family: a stuck delete is acted
/// on by operators, not waited out.
const DELETE_RETRY_LIMIT: i32 = 10;
const DEFAULT_RETRY_LIMIT: i32 = 60;

/// Run the worker loop until the store fails.
///
/// Ticks once per configured interval; an empty queue is normal, any other
/// pop failure is fatal and ends the loop.
pub async fn run_worker(state: AppState) -> Result<(), StoreError> {
    let client = WebhookClient::new();
    let mut tick = tokio::time::interval(state.config.tasks.worker_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;
        warn_on_unfinished_tasks(&state).await;

        let task = match state.store.pop_pending_task().await {
            Ok(Some(task)) => task,
            Ok(None) => continue,
            Err(err) => {
                tracing::error!(error = %err, "getting a pending task failed");
                return Err(err);
            }
        };

        tracing::info!(task_id = %task.task, action = %task.action, "started task");
        run_task(&state, &client, &task).await;
        tracing::info!(task_id = %task.task, "finished task");
    }
}

/// Log a warning when tasks have been started for over 24 hours.
pub async fn warn_on_unfinished_tasks(state: &AppState) {
    match state.store.count_stale_started_tasks().await {
        Ok(amount) if amount > 0 => {
            tracing::warn!(
                amount,
                "started tasks are over 24 hours old and have not finished; they may be stale"
            );
        }
        Ok(_) => {}
        Err(err) => tracing::error!(error = %err, "unable to count stale tasks"),
    }
}

/// Dispatch one started task by action.
pub async fn run_task(state: &AppState, client: &WebhookClient, task: &TaskRow) {
    match TaskAction::parse(&task.action) {
        Some(TaskAction::Delete) => run_delete(state, task).await,
        Some(TaskAction::ResyncFromProvider) => run_resync_from_provider(state, task).await,
        Some(TaskAction::ResyncUntilAvailable) => run_resync_until_available(state, task).await,
        Some(TaskAction::PerformPostProvision) => run_perform_post_provision(state, task).await,
        Some(TaskAction::NotifyCreateServiceWebhook) => {
            run_notify_create_service_webhook(state, client, task).await
        }
        Some(TaskAction::ChangePlans) => run_change_plans(state, task).await,
        Some(TaskAction::ChangeProviders) => run_change_providers(state, task).await,
        Some(TaskAction::NotifyCreateBindingWebhook) | Some(TaskAction::RestoreResource) => {
            // Reserved actions: nothing dispatches them yet, but a row that
            // somehow carries one must not sit in `started` forever.
            tracing::warn!(task_id = %task.task, action = %task.action,
                "reserved task action has no dispatcher");
            finish_task(
                state,
                task.task,
                task.retries,
                format!("task action {} is reserved and cannot be run", task.action),
                TaskStatus::Failed,
            )
            .await;
        }
        None => {
            tracing::warn!(task_id = %task.task, action = %task.action, "unknown task action");
            finish_task(
                state,
                task.task,
                task.retries,
                format!("unknown task action {}", task.action),
                TaskStatus::Failed,
            )
            .await;
        }
    }
}

/// Terminal update: set status, stamp `finished`, record the result.
async fn finish_task(
    state: &AppState,
    task_id: Uuid,
    retries: i32,
    result: String,
    task_status: TaskStatus,
) {
    let patch = TaskPatch {
        status: Some(task_status.as_str().to_string()),
        retries: Some(retries),
        result: Some(result),
        finished: Some(OffsetDateTime::now_utc()),
        ..TaskPatch::default()
    };
    if let Err(err) = state.store.update_task(task_id, &patch).await {
        tracing::error!(task_id = %task_id, error = %err, "unable to finish task");
    }
}

/// Non-terminal update: back to `pending` with the given retry count and a
/// human-readable result. The update bumps `updated`, so the retry moves to
/// the back of the queue.
async fn requeue_task(state: &AppState, task_id: Uuid, retries: i32, result: String) {
    let patch = TaskPatch {
        status: Some(TaskStatus::Pending.as_str().to_string()),
        retries: Some(retries),
        result: Some(result),
        ..TaskPatch::default()
    };
    if let Err(err) = state.store.update_task(task_id, &patch).await {
        tracing::error!(task_id = %task_id, error = %err, "unable to requeue task");
    }
}

async fn run_delete(state: &AppState, task: &TaskRow) {
    if task.retries >= DELETE_RETRY_LIMIT {
        tracing::info!(task_id = %task.task, retries = task.retries, "retry limit reached");
        finish_task(
            state,
            task.task,
            task.retries,
            format!(
                "Unable to delete instance {} as it failed multiple times ({})",
                task.resource, task.result
            ),
            TaskStatus::Failed,
        )
        .await;
        return;
    }

    let instance = match resolve_instance(&state.store, &state.providers, &task.resource).await {
        Ok(instance) => instance,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                format!("Cannot get instance: {err}"),
            )
            .await;
            return;
        }
    };
    let provider = match state.providers.for_plan(&instance.plan) {
        Ok(provider) => provider,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                format!("Cannot get provider: {err}"),
            )
            .await;
            return;
        }
    };
    if let Err(err) = provider.deprovision(&instance, true).await {
        requeue_task(
            state,
            task.task,
            task.retries + 1,
            format!("Failed to deprovision: {err}"),
        )
        .await;
        return;
    }
    if let Err(err) = state.store.delete_instance(&instance.id).await {
        requeue_task(
            state,
            task.task,
            task.retries + 1,
            format!("Failed to delete: {err}"),
        )
        .await;
        return;
    }
    finish_task(state, task.task, task.retries, String::new(), TaskStatus::Finished).await;
}

async fn run_resync_from_provider(state: &AppState, task: &TaskRow) {
    if task.retries >= DEFAULT_RETRY_LIMIT {
        tracing::info!(task_id = %task.task, retries = task.retries, "retry limit reached");
        finish_task(
            state,
            task.task,
            task.retries,
            format!(
                "Unable to resync information from provider for instance {} as it failed multiple times ({})",
                task.resource, task.result
            ),
            TaskStatus::Failed,
        )
        .await;
        return;
    }

    let instance = match resolve_instance(&state.store, &state.providers, &task.resource).await {
        Ok(instance) => instance,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                format!("Cannot get instance: {err}"),
            )
            .await;
            return;
        }
    };
    let entry = match state.store.get_instance(&task.resource).await {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                "Cannot get entry: resource is gone".to_string(),
            )
            .await;
            return;
        }
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                format!("Cannot get entry: {err}"),
            )
            .await;
            return;
        }
    };

    if instance.status == entry.status {
        requeue_task(
            state,
            task.task,
            task.retries + 1,
            "No change in status since last check".to_string(),
        )
        .await;
        return;
    }
    if let Err(err) = state.store.update_instance(&instance, instance.plan.id).await {
        requeue_task(
            state,
            task.task,
            task.retries + 1,
            format!("Failed to update instance: {err}"),
        )
        .await;
        return;
    }
    finish_task(state, task.task, task.retries, String::new(), TaskStatus::Finished).await;
}

async fn run_resync_until_available(state: &AppState, task: &TaskRow) {
    if task.retries >= DEFAULT_RETRY_LIMIT {
        tracing::info!(task_id = %task.task, retries = task.retries, "retry limit reached");
        finish_task(
            state,
            task.task,
            task.retries,
            format!(
                "Unable to resync information from provider for instance {} as it failed multiple times ({})",
                task.resource, task.result
            ),
            TaskStatus::Failed,
        )
        .await;
        return;
    }

    let instance = match resolve_instance(&state.store, &state.providers, &task.resource).await {
        Ok(instance) => instance,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                format!("Cannot get instance: {err}"),
            )
            .await;
            return;
        }
    };
    if let Err(err) = state.store.update_instance(&instance, instance.plan.id).await {
        requeue_task(
            state,
            task.task,
            task.retries + 1,
            format!("Failed to update instance: {err}"),
        )
        .await;
        return;
    }
    if !instance.available() {
        requeue_task(
            state,
            task.task,
            task.retries + 1,
            format!("No change in status since last check ({})", instance.status),
        )
        .await;
        return;
    }
    finish_task(state, task.task, task.retries, String::new(), TaskStatus::Finished).await;
}

async fn run_perform_post_provision(state: &AppState, task: &TaskRow) {
    if task.retries >= DEFAULT_RETRY_LIMIT {
        tracing::info!(task_id = %task.task, retries = task.retries, "retry limit reached");
        finish_task(
            state,
            task.task,
            task.retries,
            format!(
                "Unable to resync information from provider for instance {} as it failed multiple times ({})",
                task.resource, task.result
            ),
            TaskStatus::Failed,
        )
        .await;
        return;
    }

    let instance = match resolve_instance(&state.store, &state.providers, &task.resource).await {
        Ok(instance) => instance,
        Err(err) => {
            // Transient lookup failures do not consume a retry here; the cap
            // only counts observed provider state.
            requeue_task(
                state,
                task.task,
                task.retries,
                format!("Cannot get instance: {err}"),
            )
            .await;
            return;
        }
    };
    if let Err(err) = state.store.update_instance(&instance, instance.plan.id).await {
        requeue_task(
            state,
            task.task,
            task.retries + 1,
            format!("Failed to update instance: {err}"),
        )
        .await;
        return;
    }
    if !instance.available() {
        requeue_task(
            state,
            task.task,
            task.retries + 1,
            format!("No change in status since last check ({})", instance.status),
        )
        .await;
        return;
    }

    let provider = match state.providers.for_plan(&instance.plan) {
        Ok(provider) => provider,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries,
                format!("Cannot get provider: {err}"),
            )
            .await;
            return;
        }
    };
    let finished = match provider.perform_post_provision(&instance).await {
        Ok(instance) => instance,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                format!("Failed to perform post provision: {err}"),
            )
            .await;
            return;
        }
    };
    if let Err(err) = state.store.update_instance(&finished, finished.plan.id).await {
        requeue_task(
            state,
            task.task,
            task.retries + 1,
            format!("Failed to update instance after post provision: {err}"),
        )
        .await;
        return;
    }
    finish_task(state, task.task, task.retries, String::new(), TaskStatus::Finished).await;
}

async fn run_notify_create_service_webhook(
    state: &AppState,
    client: &WebhookClient,
    task: &TaskRow,
) {
    if task.retries >= DEFAULT_RETRY_LIMIT {
        finish_task(
            state,
            task.task,
            task.retries,
            format!("Unable to deliver webhook: {}", task.result),
            TaskStatus::Failed,
        )
        .await;
        return;
    }

    let instance = match resolve_instance(&state.store, &state.providers, &task.resource).await {
        Ok(instance) => instance,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                format!("Cannot get instance: {err}"),
            )
            .await;
            return;
        }
    };
    if !instance.available() {
        requeue_task(
            state,
            task.task,
            task.retries + 1,
            "No change in status since last check".to_string(),
        )
        .await;
        return;
    }

    let metadata: WebhookTaskMetadata = match serde_json::from_str(&task.metadata) {
        Ok(metadata) => metadata,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries,
                format!("Cannot decode task metadata for creation webhook: {err}"),
            )
            .await;
            return;
        }
    };

    let delivery = client
        .deliver(&metadata.url, &metadata.secret, &WebhookPayload::service_created())
        .await;
    let hook_status = match delivery {
        Ok(hook_status) => hook_status,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                format!("Failed to send http post operation: {err}"),
            )
            .await;
            return;
        }
    };

    if is_delivered(hook_status) {
        finish_task(
            state,
            task.task,
            task.retries,
            hook_status.to_string(),
            TaskStatus::Finished,
        )
        .await;
    } else if state.config.broker.retry_webhooks {
        requeue_task(
            state,
            task.task,
            task.retries + 1,
            format!("Got invalid http status code from hook: {hook_status}"),
        )
        .await;
    } else {
        finish_task(
            state,
            task.task,
            task.retries + 1,
            format!("Got invalid http status code from hook: {hook_status}"),
            TaskStatus::Failed,
        )
        .await;
    }
}

async fn run_change_plans(state: &AppState, task: &TaskRow) {
    if task.retries >= DEFAULT_RETRY_LIMIT {
        tracing::info!(task_id = %task.task, retries = task.retries, "retry limit reached");
        finish_task(
            state,
            task.task,
            task.retries,
            format!(
                "Unable to change plans for instance {} as it failed multiple times ({})",
                task.resource, task.result
            ),
            TaskStatus::Failed,
        )
        .await;
        return;
    }

    let instance = match resolve_instance(&state.store, &state.providers, &task.resource).await {
        Ok(instance) => instance,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries,
                format!("Cannot get instance: {err}"),
            )
            .await;
            return;
        }
    };
    let metadata: ChangePlansTaskMetadata = match serde_json::from_str(&task.metadata) {
        Ok(metadata) => metadata,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                format!("Cannot decode task metadata to change plans: {err}"),
            )
            .await;
            return;
        }
    };

    match upgrade_within_providers(state, &instance, &metadata.plan).await {
        Ok(output) => {
            finish_task(state, task.task, task.retries, output, TaskStatus::Finished).await;
        }
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                format!("Cannot change plans: {err}"),
            )
            .await;
        }
    }
}

async fn run_change_providers(state: &AppState, task: &TaskRow) {
    if task.retries >= DEFAULT_RETRY_LIMIT {
        tracing::info!(task_id = %task.task, retries = task.retries, "retry limit reached");
        finish_task(
            state,
            task.task,
            task.retries,
            format!(
                "Unable to change providers for instance {} as it failed multiple times ({})",
                task.resource, task.result
            ),
            TaskStatus::Failed,
        )
        .await;
        return;
    }

    let instance = match resolve_instance(&state.store, &state.providers, &task.resource).await {
        Ok(instance) => instance,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries,
                format!("Cannot get instance: {err}"),
            )
            .await;
            return;
        }
    };
    let metadata: ChangeProvidersTaskMetadata = match serde_json::from_str(&task.metadata) {
        Ok(metadata) => metadata,
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries,
                format!("Cannot decode task metadata to change providers: {err}"),
            )
            .await;
            return;
        }
    };

    match upgrade_across_providers(state, &instance, &metadata.plan).await {
        Ok(output) => {
            finish_task(state, task.task, task.retries, output, TaskStatus::Finished).await;
        }
        Err(err) => {
            requeue_task(
                state,
                task.task,
                task.retries + 1,
                format!("Cannot switch providers: {err}"),
            )
            .await;
        }
    }
}

/// Upgrade an instance to another plan within the same provider. Escalates
/// to the cross-provider path only when the provider reports the feature is
/// unavailable on the current plan.
async fn upgrade_within_providers(
    state: &AppState,
    instance: &Instance,
    to_plan_id: &str,
) -> Result<String, String> {
    let target_id =
        Uuid::parse_str(to_plan_id).map_err(|_| format!("plan {to_plan_id} not found"))?;
    let to_plan = state
        .store
        .get_plan(target_id)
        .await
        .map_err(|err| err.to_string())?
        .ok_or_else(|| format!("plan {to_plan_id} not found"))?;

    if to_plan.id == instance.plan.id {
        return Err("Cannot upgrade to the same plan".to_string());
    }
    if to_plan.provider != instance.plan.provider {
        return Err(
            "Unable to upgrade, different providers were passed in on both plans".to_string(),
        );
    }

    let provider = state
        .providers
        .for_plan(&instance.plan)
        .map_err(|err| err.to_string())?;

    // This could take a very long time.
    let modified = match provider.modify(instance, &to_plan).await {
        Ok(modified) => modified,
        Err(ProviderError::FeatureUnavailable) => {
            return upgrade_across_providers(state, instance, to_plan_id).await;
        }
        Err(err) => return Err(err.to_string()),
    };

    state
        .store
        .update_instance(&modified, modified.plan.id)
        .await
        .map_err(|err| {
            tracing::error!(name = %modified.name, plan_id = %modified.plan.id, error = %err,
                "cannot update instance after plan change");
            err.to_string()
        })?;

    if !modified.available() {
        if let Err(err) = state
            .store
            .add_task(&modified.id, TaskAction::ResyncFromProvider, "")
            .await
        {
            tracing::error!(name = %modified.name, error = %err,
                "unable to schedule resync from provider");
        }
    }
    Ok(String::new())
}

/// Cross-provider upgrades are reserved until a backup/restore path exists.
async fn upgrade_across_providers(
    _state: &AppState,
    _instance: &Instance,
    _to_plan_id: &str,
) -> Result<String, String> {
    Err("Instances cannot be upgraded across providers".to_string())
}
