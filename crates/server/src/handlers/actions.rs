//! Extension actions outside the OSB core surface.

use crate::error::{ApiError, ApiResult};
use crate::resolve::resolve_instance;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use basin_core::instance::User;
use basin_store::repos::InstanceRepo;

/// PUT /v2/service_instances/{instance_id}/actions/rotate_credentials
///
/// Mints a fresh access key pair for the instance's IAM user and persists
/// it. The previous key stops working immediately.
pub async fn rotate_credentials(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<User>> {
    let instance = resolve_instance(&state.store, &state.providers, &instance_id)
        .await
        .map_err(ApiError::from)?;
    let provider = state.providers.for_plan(&instance.plan)?;

    let user = provider.rotate_credentials(&instance).await.map_err(|err| {
        tracing::error!(instance_id = %instance.id, error = %err,
            "unable to rotate access keys");
        ApiError::from(err)
    })?;

    state
        .store
        .update_credentials(&instance, &user)
        .await
        .map_err(|err| {
            tracing::error!(instance_id = %instance.id, user = %user.username, error = %err,
                "unable to record rotated credentials");
            ApiError::from(err)
        })?;

    Ok(Json(user))
}
