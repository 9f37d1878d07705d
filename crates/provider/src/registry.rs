//! Provider registry.

use crate::backends::AwsS3Provider;
use crate::error::{ProviderError, ProviderResult};
use crate::traits::Provider;
use basin_core::config::AwsConfig;
use basin_core::plan::{Plan, ProviderKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves a plan's provider kind to a shared backend instance.
///
/// Backends are constructed once at startup and shared; plans only carry
/// the kind tag.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// An empty registry. Mostly useful for tests that register doubles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend for a provider kind.
    pub fn register(&mut self, kind: ProviderKind, provider: Arc<dyn Provider>) {
        self.providers.insert(kind, provider);
    }

    /// Build the registry with every configured backend.
    pub async fn from_config(name_prefix: &str, aws: &AwsConfig) -> ProviderResult<Self> {
        let mut registry = Self::new();
        registry.register(
            ProviderKind::AwsS3,
            Arc::new(AwsS3Provider::new(name_prefix, &aws.region).await?),
        );
        Ok(registry)
    }

    /// The backend serving a plan.
    pub fn for_plan(&self, plan: &Plan) -> ProviderResult<Arc<dyn Provider>> {
        self.providers
            .get(&plan.provider)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(plan.provider.to_string()))
    }
}
