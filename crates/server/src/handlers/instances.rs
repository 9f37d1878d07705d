//! Service instance lifecycle handlers: provision, deprovision, update,
//! last-operation.

use crate::error::{ApiError, ApiResult};
use crate::osb::{
    AsyncQuery, LastOperationResponse, OperationResponse, ProvisionQuery, ProvisionRequest,
    UpdateRequest,
};
use crate::resolve::{claim_unclaimed_instance, resolve_instance, ResolveError};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use basin_core::instance::Instance;
use basin_core::plan::Plan;
use basin_core::status;
use basin_core::task::{ChangePlansTaskMetadata, TaskAction, WebhookTaskMetadata};
use basin_store::repos::{CatalogRepo, InstanceRepo, TaskRepo};
use uuid::Uuid;

/// PUT /v2/service_instances/{instance_id}
///
/// Never wait for the provider to report ready here: backend creation can
/// take many minutes, and the platform polls last_operation for progress.
pub async fn provision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<ProvisionQuery>,
    Json(request): Json<ProvisionRequest>,
) -> ApiResult<(StatusCode, Json<OperationResponse>)> {
    let _guard = state.write_lock.lock().await;

    if !query.accepts_incomplete {
        return Err(ApiError::async_required());
    }
    if instance_id.is_empty() {
        return Err(ApiError::unprocessable(
            "InstanceRequired",
            "The instance ID was not provided.",
        ));
    }

    let plan_id = Uuid::parse_str(&request.plan_id).map_err(|_| ApiError::NotFound)?;
    let plan = state
        .store
        .get_plan(plan_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    // Idempotency before uniqueness: a repeat of an identical request
    // succeeds, anything else on a known id is a conflict.
    match resolve_instance(&state.store, &state.providers, &instance_id).await {
        Ok(existing) => {
            if existing.plan.id != plan.id {
                return Err(ApiError::Conflict("InstanceID in use".to_string()));
            }
            return Ok((StatusCode::OK, Json(OperationResponse { operation: None })));
        }
        Err(ResolveError::NotFound) => {}
        Err(err) => return Err(err.into()),
    }

    // Ids are never reusable, even after deletion.
    if state.store.instance_id_in_use(&instance_id).await? {
        return Err(ApiError::Conflict(
            "The instance ID was either already in-use or invalid.".to_string(),
        ));
    }

    let instance =
        match claim_unclaimed_instance(&state.store, &state.providers, plan.id, &instance_id)
            .await
            .map_err(|err| {
                tracing::error!(instance_id = %instance_id, error = %err,
                    "fatal error while claiming pooled instance");
                ApiError::from(err)
            })? {
            Some(instance) => instance,
            None => provision_new(&state, &instance_id, &plan, &query, &request).await?,
        };

    if instance.ready {
        Ok((
            StatusCode::CREATED,
            Json(OperationResponse { operation: None }),
        ))
    } else {
        Ok((
            StatusCode::ACCEPTED,
            Json(OperationResponse {
                operation: Some(instance_id),
            }),
        ))
    }
}

/// Synthesise a brand new bucket when the pool has nothing to offer.
async fn provision_new(
    state: &AppState,
    instance_id: &str,
    plan: &Plan,
    query: &ProvisionQuery,
    request: &ProvisionRequest,
) -> ApiResult<Instance> {
    let provider = state.providers.for_plan(plan)?;
    let instance = provider
        .provision(instance_id, plan, &request.organization_guid)
        .await
        .map_err(|err| {
            tracing::error!(instance_id = %instance_id, error = %err,
                "error provisioning resource");
            ApiError::from(err)
        })?;

    if let Err(err) = state.store.add_instance(&instance).await {
        tracing::error!(instance_id = %instance_id, error = %err,
            "error inserting provisioned record");
        // The bucket exists but the row does not: compensate, and if that
        // fails too, leave a delete task so the worker reclaims the orphan.
        if let Err(err) = provider.deprovision(&instance, false).await {
            tracing::error!(instance_id = %instance.id, name = %instance.name, error = %err,
                "compensating deprovision failed after insert failure");
            if let Err(err) = state
                .store
                .add_task(&instance.id, TaskAction::Delete, &instance.name)
                .await
            {
                tracing::error!(name = %instance.name, error = %err,
                    "unable to enqueue delete task, resource is orphaned");
            }
        }
        return Err(err.into());
    }

    if !instance.available() {
        if let Err(err) = state
            .store
            .add_task(&instance.id, TaskAction::PerformPostProvision, "")
            .await
        {
            tracing::error!(name = %instance.name, error = %err,
                "unable to schedule post-provision resync");
        }
        if let (Some(url), Some(secret)) = (&query.webhook, &query.secret) {
            let metadata = serde_json::to_string(&WebhookTaskMetadata {
                url: url.clone(),
                secret: secret.clone(),
            })
            .map_err(|err| ApiError::Internal(err.to_string()))?;
            if let Err(err) = state
                .store
                .add_task(&instance.id, TaskAction::NotifyCreateServiceWebhook, &metadata)
                .await
            {
                tracing::error!(name = %instance.name, error = %err,
                    "unable to schedule creation webhook");
            }
        }
    }

    Ok(instance)
}

/// DELETE /v2/service_instances/{instance_id}
pub async fn deprovision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(_query): Query<AsyncQuery>,
) -> ApiResult<(StatusCode, Json<OperationResponse>)> {
    let _guard = state.write_lock.lock().await;

    let instance = resolve_instance(&state.store, &state.providers, &instance_id)
        .await
        .map_err(ApiError::from)?;
    let provider = state.providers.for_plan(&instance.plan)?;

    if let Err(err) = provider.deprovision(&instance, true).await {
        tracing::error!(instance_id = %instance.id, name = %instance.name, error = %err,
            "deprovision failed, deferring to the task worker");
        state
            .store
            .add_task(&instance.id, TaskAction::Delete, &instance.name)
            .await?;
        return Ok((
            StatusCode::ACCEPTED,
            Json(OperationResponse {
                operation: Some(instance_id),
            }),
        ));
    }

    state.store.delete_instance(&instance.id).await?;
    Ok((StatusCode::OK, Json(OperationResponse { operation: None })))
}

/// PATCH /v2/service_instances/{instance_id}
pub async fn update(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
    Json(request): Json<UpdateRequest>,
) -> ApiResult<(StatusCode, Json<OperationResponse>)> {
    if !query.accepts_incomplete {
        return Err(ApiError::async_required());
    }

    let instance = resolve_instance(&state.store, &state.providers, &instance_id)
        .await
        .map_err(ApiError::from)?;

    let Some(plan_id) = request.plan_id.as_deref() else {
        return Err(ApiError::unprocessable(
            "PlanRequired",
            "The plan ID was not provided.",
        ));
    };

    if !status::is_available(&instance.status) {
        return Err(ApiError::unprocessable(
            "ConcurrencyError",
            "Clients MUST wait until pending requests have completed for the specified resources.",
        ));
    }

    if plan_id.eq_ignore_ascii_case(&instance.plan.id.to_string()) {
        return Err(ApiError::unprocessable(
            "UpgradeError",
            "Cannot upgrade to the same plan.",
        ));
    }

    let target_id = Uuid::parse_str(plan_id).map_err(|_| ApiError::NotFound)?;
    let target_plan = state
        .store
        .get_plan(target_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if instance.plan.provider != target_plan.provider {
        return Err(ApiError::unprocessable(
            "UpgradeError",
            "Cannot upgrade or change plans across provider types.",
        ));
    }

    let metadata = serde_json::to_string(&ChangePlansTaskMetadata {
        plan: target_plan.id.to_string(),
    })
    .map_err(|err| ApiError::Internal(err.to_string()))?;
    state
        .store
        .add_task(&instance.id, TaskAction::ChangePlans, &metadata)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(OperationResponse {
            operation: Some(instance_id),
        }),
    ))
}

/// GET /v2/service_instances/{instance_id}/last_operation
pub async fn last_operation(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<LastOperationResponse>> {
    let upgrading = state.store.is_upgrading(&instance_id).await?;
    let restoring = state.store.is_restoring(&instance_id).await?;

    if upgrading || restoring {
        let mut description = if upgrading { "upgrading" } else { "restoring" }.to_string();
        if let Ok(instance) =
            resolve_instance(&state.store, &state.providers, &instance_id).await
        {
            if !instance.available() {
                description = instance.status;
            }
        }
        return Ok(Json(LastOperationResponse::in_progress(description)));
    }

    let instance = resolve_instance(&state.store, &state.providers, &instance_id)
        .await
        .map_err(ApiError::from)?;

    // Persist the refreshed view; a failure here only delays convergence.
    if let Err(err) = state
        .store
        .update_instance(&instance, instance.plan.id)
        .await
    {
        tracing::warn!(instance_id = %instance.id, error = %err,
            "unable to persist refreshed instance state");
    }

    let response = if instance.ready {
        LastOperationResponse::succeeded(instance.status.clone())
    } else if status::in_progress(&instance.status) {
        LastOperationResponse::in_progress(instance.status.clone())
    } else {
        LastOperationResponse::failed(instance.status.clone())
    };
    Ok(Json(response))
}
