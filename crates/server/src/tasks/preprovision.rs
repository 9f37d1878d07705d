//! Preprovisioning loop.
//!
//! Cloud-side bucket and IAM creation takes seconds to tens of seconds;
//! keeping a warm pool of unclaimed instances per plan converts provision
//! latency to effectively zero. This reconciler tops each plan's pool up to
//! its `preprovision` target.

use crate::state::AppState;
use basin_core::task::TaskAction;
use basin_core::PREPROVISIONED_OWNER;
use basin_store::repos::{CatalogRepo, InstanceRepo, TaskRepo};
use std::time::Duration;

/// Run the reconciler forever on the configured interval.
pub async fn run_preprovision_loop(state: AppState) {
    let mut tick = tokio::time::interval(state.config.tasks.preprovision_interval());
    loop {
        tick.tick().await;
        run_preprovision_once(&state, state.config.tasks.preprovision_wait()).await;
    }
}

/// One reconciliation pass: insert the shortfall rows, then provision each
/// one, spacing creations by `wait` to throttle cloud API pressure.
pub async fn run_preprovision_once(state: &AppState, wait: Duration) {
    let entries = match state.store.start_provisioning_tasks().await {
        Ok(entries) => entries,
        Err(err) => {
            tracing::error!(error = %err, "unable to compute preprovision shortfall");
            return;
        }
    };

    for entry in entries {
        tracing::info!(pool_id = %entry.id, plan_id = %entry.plan,
            "preprovisioning pooled instance");

        let plan = match state.store.get_plan(entry.plan).await {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                tracing::error!(pool_id = %entry.id, plan_id = %entry.plan,
                    "cannot preprovision, plan is gone");
                nuke(state, &entry.id).await;
                continue;
            }
            Err(err) => {
                tracing::error!(pool_id = %entry.id, plan_id = %entry.plan, error = %err,
                    "cannot preprovision, plan lookup failed");
                nuke(state, &entry.id).await;
                continue;
            }
        };
        let provider = match state.providers.for_plan(&plan) {
            Ok(provider) => provider,
            Err(err) => {
                tracing::error!(pool_id = %entry.id, error = %err,
                    "cannot preprovision, no provider for plan");
                nuke(state, &entry.id).await;
                continue;
            }
        };

        let instance = match provider
            .provision(&entry.id, &plan, PREPROVISIONED_OWNER)
            .await
        {
            Ok(instance) => instance,
            Err(err) => {
                tracing::error!(pool_id = %entry.id, plan_id = %plan.id, error = %err,
                    "error preprovisioning instance");
                nuke(state, &entry.id).await;
                continue;
            }
        };

        if let Err(err) = state.store.update_instance(&instance, instance.plan.id).await {
            tracing::error!(pool_id = %entry.id, error = %err,
                "error recording preprovisioned instance");
            if let Err(err) = provider.deprovision(&instance, false).await {
                tracing::error!(pool_id = %instance.id, name = %instance.name, error = %err,
                    "compensating deprovision failed after record failure");
                if let Err(err) = state
                    .store
                    .add_task(&instance.id, TaskAction::Delete, &instance.name)
                    .await
                {
                    tracing::error!(name = %instance.name, error = %err,
                        "unable to enqueue delete task, resource is orphaned");
                }
            }
            continue;
        }

        if !instance.available() {
            if let Err(err) = state
                .store
                .add_task(&instance.id, TaskAction::ResyncUntilAvailable, "")
                .await
            {
                tracing::error!(name = %instance.name, error = %err,
                    "unable to schedule resync until available");
            }
        }

        tracing::info!(pool_id = %entry.id, plan_id = %entry.plan,
            "finished preprovisioning pooled instance");
        tokio::time::sleep(wait).await;
    }
}

async fn nuke(state: &AppState, id: &str) {
    if let Err(err) = state.store.nuke_instance(id).await {
        tracing::error!(pool_id = %id, error = %err, "unable to remove provisional pool row");
    }
}
