//! Service binding handlers: bind, unbind, get-binding.

use crate::error::{ApiError, ApiResult};
use crate::osb::{BindRequest, BindResponse};
use crate::resolve::resolve_instance;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use basin_core::status;

/// PUT /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub async fn bind(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Json(request): Json<BindRequest>,
) -> ApiResult<(StatusCode, Json<BindResponse>)> {
    let _guard = state.write_lock.lock().await;

    let instance = resolve_instance(&state.store, &state.providers, &instance_id)
        .await
        .map_err(ApiError::from)?;
    if !instance.ready {
        return Err(ApiError::unprocessable(
            "ServiceNotYetAvailable",
            "The service requested is not yet available.",
        ));
    }

    let provider = state.providers.for_plan(&instance.plan)?;

    if let Some(app_guid) = request
        .bind_resource
        .as_ref()
        .and_then(|bind| bind.app_guid.as_deref())
    {
        provider.tag(&instance, "Binding", &binding_id).await?;
        provider.tag(&instance, "App", app_guid).await?;
    }

    // Credentials go straight to the caller; nothing is persisted.
    Ok((
        StatusCode::CREATED,
        Json(BindResponse {
            credentials: provider.get_url(&instance),
        }),
    ))
}

/// DELETE /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub async fn unbind(
    State(state): State<AppState>,
    Path((instance_id, _binding_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let _guard = state.write_lock.lock().await;

    let instance = resolve_instance(&state.store, &state.providers, &instance_id)
        .await
        .map_err(ApiError::from)?;
    if !instance.ready {
        return Err(ApiError::unprocessable(
            "ServiceNotYetAvailable",
            "The service requested is not yet available.",
        ));
    }

    let provider = state.providers.for_plan(&instance.plan)?;
    provider.untag(&instance, "Binding").await?;
    provider.untag(&instance, "App").await?;

    Ok(Json(serde_json::json!({})))
}

/// GET /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub async fn get_binding(
    State(state): State<AppState>,
    Path((instance_id, _binding_id)): Path<(String, String)>,
) -> ApiResult<Json<BindResponse>> {
    let instance = resolve_instance(&state.store, &state.providers, &instance_id)
        .await
        .map_err(ApiError::from)?;
    if !status::can_get_bindings(&instance.status) {
        return Err(ApiError::unprocessable(
            "ServiceNotYetAvailable",
            "The service requested is not yet available.",
        ));
    }

    let provider = state.providers.for_plan(&instance.plan)?;
    Ok(Json(BindResponse {
        credentials: provider.get_url(&instance),
    }))
}
