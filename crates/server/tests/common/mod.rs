//! Common test utilities and fixtures.

pub mod memory;
pub mod provider;

#[allow(unused_imports)]
pub use memory::{MemoryStore, ResourceRecord};
#[allow(unused_imports)]
pub use provider::MockProvider;

use axum::http::StatusCode;
use basin_core::config::AppConfig;
use basin_core::plan::{Plan, ProviderKind};
use basin_server::{create_router, AppState};
use basin_store::models::ServiceRow;
use basin_store::BrokerStore;
use basin_provider::ProviderRegistry;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

pub const SERVICE_ID: &str = "0124611d-2971-4533-8e38-a816a7a95ff1";
pub const BASIC_PLAN_ID: &str = "1448e0b0-429a-4fa8-92a0-fd0d9e121cae";
pub const VERSIONED_PLAN_ID: &str = "aaa8e0b0-429a-44a8-32aa-1d119e12feac";
/// A plan served by a provider kind no backend is registered for.
pub const FOREIGN_PLAN_ID: &str = "b448e0b0-429a-4fa8-92a0-fd0d9e121c00";

/// A test broker wired to the in-memory store and the mock provider.
pub struct TestContext {
    pub state: AppState,
    pub router: axum::Router,
    pub store: Arc<MemoryStore>,
    pub provider: Arc<MockProvider>,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        Self::with_config(AppConfig::for_testing())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.seed_service(sample_service());
        store.seed_plan(sample_plan(BASIC_PLAN_ID, "basic", ProviderKind::AwsS3, 0));
        store.seed_plan(sample_plan(
            VERSIONED_PLAN_ID,
            "versioned",
            ProviderKind::AwsS3,
            0,
        ));
        store.seed_plan(sample_plan(
            FOREIGN_PLAN_ID,
            "foreign",
            ProviderKind::Unknown,
            0,
        ));

        let provider = Arc::new(MockProvider::new());
        let mut providers = ProviderRegistry::new();
        providers.register(ProviderKind::AwsS3, provider.clone());

        let state = AppState::new(
            config,
            store.clone() as Arc<dyn BrokerStore>,
            Arc::new(providers),
        );
        let router = create_router(state.clone());

        Self {
            state,
            router,
            store,
            provider,
        }
    }

    /// Seed an available, claimed resource the mock provider will also
    /// report as available.
    pub fn seed_available_resource(&self, id: &str, name: &str) {
        self.store.seed_resource(ResourceRecord {
            id: id.to_string(),
            name: name.to_string(),
            plan: Uuid::parse_str(BASIC_PLAN_ID).unwrap(),
            claimed: true,
            status: "available".to_string(),
            username: "AKIASEEDED00000001".to_string(),
            password: "seeded-secret".to_string(),
            endpoint: format!("{name}.s3.amazonaws.com"),
            deleted: false,
        });
    }

    /// Seed an unclaimed pool row eligible for claiming.
    pub fn seed_pool_resource(&self, plan_id: &str, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.store.seed_resource(ResourceRecord {
            id: id.clone(),
            name: name.to_string(),
            plan: Uuid::parse_str(plan_id).unwrap(),
            claimed: false,
            status: "available".to_string(),
            username: "AKIAPOOLED00000001".to_string(),
            password: "pooled-secret".to_string(),
            endpoint: format!("{name}.s3.amazonaws.com"),
            deleted: false,
        });
        id
    }
}

pub fn sample_service() -> ServiceRow {
    let now = OffsetDateTime::now_utc();
    ServiceRow {
        service: Uuid::parse_str(SERVICE_ID).unwrap(),
        name: "basin-s3".to_string(),
        human_name: "Basin S3".to_string(),
        description: "Amazon S3 buckets for object storage.".to_string(),
        categories: "Data Stores,S3".to_string(),
        image: String::new(),
        beta: false,
        deprecated: false,
        created: now,
        updated: now,
    }
}

pub fn sample_plan(id: &str, name: &str, provider: ProviderKind, preprovision: i32) -> Plan {
    let now = OffsetDateTime::now_utc();
    Plan {
        id: Uuid::parse_str(id).unwrap(),
        service_id: Uuid::parse_str(SERVICE_ID).unwrap(),
        service_name: "basin-s3".to_string(),
        name: name.to_string(),
        human_name: format!("AWS S3 - {name}"),
        description: "Amazon S3 bucket".to_string(),
        engine_version: "v1".to_string(),
        engine_type: "s3".to_string(),
        scheme: "s3".to_string(),
        categories: "Data Stores".to_string(),
        cost_cents: 5000,
        cost_unit: "month".to_string(),
        attributes: serde_json::json!({"versioned": "false"}),
        provider,
        provider_private_details: r#"{"versioned":false,"marker":"private-details-marker"}"#
            .to_string(),
        preprovision,
        installable_inside_private_network: true,
        installable_outside_private_network: true,
        supports_multiple_installations: true,
        supports_sharing: true,
        beta: false,
        deprecated: false,
        created: now,
        updated: now,
    }
}

/// Issue a JSON request against the router and decode the response.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_json: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null)
    };

    (status, body_json)
}
