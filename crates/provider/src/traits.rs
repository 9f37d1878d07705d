//! Provider trait definition.

use crate::error::ProviderResult;
use async_trait::async_trait;
use basin_core::instance::{Instance, User};
use basin_core::plan::Plan;
use serde::Deserialize;

/// Backend-private settings carried in a plan's provider-private details.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3Settings {
    #[serde(default)]
    pub versioned: bool,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default, rename = "kmsKeyId")]
    pub kms_key_id: String,
}

impl S3Settings {
    /// Parse settings from a plan's private details.
    pub fn from_plan(plan: &Plan) -> ProviderResult<Self> {
        Ok(serde_json::from_str(&plan.provider_private_details)?)
    }
}

/// Capability abstraction over a single cloud backend.
///
/// The core treats this as opaque: it owns cloud-side state and nothing
/// else. Durable rows belong to the store; implementations must not try to
/// track instance ids or credentials beyond a soft read cache.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Look up the live instance by cloud-side name. May be served from a
    /// short-lived cache; never used to decide state-changing operations.
    async fn get_instance(&self, name: &str, plan: &Plan) -> ProviderResult<Instance>;

    /// Create the backend resources for a new instance.
    async fn provision(&self, id: &str, plan: &Plan, owner: &str) -> ProviderResult<Instance>;

    /// Tear down the backend resources.
    async fn deprovision(&self, instance: &Instance, take_snapshot: bool) -> ProviderResult<()>;

    /// Move the instance to another plan within this provider.
    async fn modify(&self, instance: &Instance, plan: &Plan) -> ProviderResult<Instance>;

    /// Add or replace a tag on the backend resource.
    async fn tag(&self, instance: &Instance, name: &str, value: &str) -> ProviderResult<()>;

    /// Remove a tag from the backend resource.
    async fn untag(&self, instance: &Instance, name: &str) -> ProviderResult<()>;

    /// Revoke the instance's access keys and mint a fresh pair.
    async fn rotate_credentials(&self, instance: &Instance) -> ProviderResult<User>;

    /// Backend hook run once the instance first reports available.
    async fn perform_post_provision(&self, instance: &Instance) -> ProviderResult<Instance>;

    /// The binding credentials object handed to OSB clients.
    fn get_url(&self, instance: &Instance) -> serde_json::Value;
}
