//! Instance resolution.
//!
//! An `Instance` is the stored row merged with what the provider reports:
//! the provider wins on status, the store fills in credentials and the
//! endpoint where the provider returns blanks.

use basin_core::instance::Instance;
use basin_provider::{ProviderError, ProviderRegistry};
use basin_store::repos::{CatalogRepo, InstanceRepo};
use basin_store::{BrokerStore, StoreError};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;

/// Resolution errors. `NotFound` covers the missing row, the missing plan,
/// and anything else that makes the instance unreachable by id.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("cannot find resource instance")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound => ApiError::NotFound,
            ResolveError::Store(e) => ApiError::Store(e),
            ResolveError::Provider(e) => ApiError::Provider(e),
        }
    }
}

/// Look up an instance by its durable id.
pub async fn resolve_instance(
    store: &Arc<dyn BrokerStore>,
    providers: &ProviderRegistry,
    id: &str,
) -> Result<Instance, ResolveError> {
    let entry = store
        .get_instance(id)
        .await?
        .ok_or(ResolveError::NotFound)?;
    let plan = store
        .get_plan(entry.plan)
        .await?
        .ok_or(ResolveError::NotFound)?;
    let provider = providers.for_plan(&plan)?;

    let mut instance = provider.get_instance(&entry.name, &plan).await?;
    instance.id = entry.id;
    if instance.username.is_empty() {
        instance.username = entry.username;
    }
    if instance.password.is_empty() {
        instance.password = entry.password;
    }
    if instance.endpoint.is_empty() {
        instance.endpoint = entry.endpoint;
    }
    Ok(instance)
}

/// Claim a pooled instance for `new_instance_id`. Returns None when the
/// pool has no candidate. If the claim commits but the claimed instance
/// cannot be resolved, the row is returned to the pool before the error
/// propagates.
pub async fn claim_unclaimed_instance(
    store: &Arc<dyn BrokerStore>,
    providers: &ProviderRegistry,
    plan_id: Uuid,
    new_instance_id: &str,
) -> Result<Option<Instance>, ResolveError> {
    let Some(entry) = store
        .get_unclaimed_instance(plan_id, new_instance_id)
        .await?
    else {
        return Ok(None);
    };

    match resolve_instance(store, providers, &entry.id).await {
        Ok(instance) => Ok(Some(instance)),
        Err(err) => {
            store.return_claimed_instance(&entry.id).await?;
            Err(err)
        }
    }
}
