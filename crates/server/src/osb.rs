//! OSB v2 wire types.
//!
//! Request and response shapes for the subset of the Open Service Broker
//! API this broker implements, plus the catalog response builder. Plan
//! metadata is assembled here and deliberately never touches
//! `provider_private_details`.

use basin_core::plan::Plan;
use basin_store::models::ServiceRow;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Query parameters accepted on provision requests.
#[derive(Debug, Default, Deserialize)]
pub struct ProvisionQuery {
    #[serde(default)]
    pub accepts_incomplete: bool,
    /// Callback URL to notify once the instance becomes available.
    pub webhook: Option<String>,
    /// Shared secret the callback payload is signed with.
    pub secret: Option<String>,
}

/// Query parameters accepted on deprovision and update requests.
#[derive(Debug, Default, Deserialize)]
pub struct AsyncQuery {
    #[serde(default)]
    pub accepts_incomplete: bool,
}

/// PUT /v2/service_instances/{instance_id}
#[derive(Debug, Default, Deserialize)]
pub struct ProvisionRequest {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub organization_guid: String,
    #[serde(default)]
    pub space_guid: String,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

/// PATCH /v2/service_instances/{instance_id}
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub service_id: String,
    pub plan_id: Option<String>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

/// PUT /v2/service_instances/{instance_id}/service_bindings/{binding_id}
#[derive(Debug, Default, Deserialize)]
pub struct BindRequest {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    pub bind_resource: Option<BindResource>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BindResource {
    pub app_guid: Option<String>,
}

/// Response for provision/deprovision/update; `operation` is the key the
/// platform polls last_operation with.
#[derive(Debug, Serialize)]
pub struct OperationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

/// GET .../last_operation
#[derive(Debug, Serialize)]
pub struct LastOperationResponse {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl LastOperationResponse {
    pub fn in_progress(description: String) -> Self {
        Self {
            state: "in progress".to_string(),
            description: Some(description),
        }
    }

    pub fn succeeded(description: String) -> Self {
        Self {
            state: "succeeded".to_string(),
            description: Some(description),
        }
    }

    pub fn failed(description: String) -> Self {
        Self {
            state: "failed".to_string(),
            description: Some(description),
        }
    }
}

/// Bind / get-binding response.
#[derive(Debug, Serialize)]
pub struct BindResponse {
    pub credentials: serde_json::Value,
}

/// GET /v2/catalog
#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub services: Vec<CatalogService>,
}

#[derive(Debug, Serialize)]
pub struct CatalogService {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub bindings_retrievable: bool,
    pub plan_updateable: bool,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub plans: Vec<CatalogPlan>,
}

#[derive(Debug, Serialize)]
pub struct CatalogPlan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub free: bool,
    pub schemas: serde_json::Value,
    pub metadata: serde_json::Value,
}

impl CatalogService {
    /// Assemble the catalog entry for a service and its plans.
    pub fn from_rows(service: &ServiceRow, plans: &[Plan]) -> Self {
        Self {
            id: service.service.to_string(),
            name: service.name.clone(),
            description: service.description.clone(),
            bindable: true,
            bindings_retrievable: true,
            plan_updateable: true,
            tags: service
                .categories
                .split(',')
                .map(|tag| tag.trim().to_string())
                .collect(),
            metadata: json!({
                "name": service.human_name,
                "image": service.image,
            }),
            plans: plans.iter().map(CatalogPlan::from_plan).collect(),
        }
    }
}

impl CatalogPlan {
    /// Assemble the catalog entry for a plan. Provider-private details are
    /// not part of `Plan`'s serializable surface and never appear here.
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            id: plan.id.to_string(),
            name: plan.name.clone(),
            description: plan.description.clone(),
            free: plan.free(),
            schemas: json!({
                "service_instance": { "create": { "parameters": {} } }
            }),
            metadata: json!({
                "addon_service": {
                    "id": plan.service_id.to_string(),
                    "name": plan.service_name,
                },
                "created_at": plan.created,
                "description": plan.description,
                "human_name": plan.human_name,
                "id": plan.id.to_string(),
                "installable_inside_private_network": plan.installable_inside_private_network,
                "installable_outside_private_network": plan.installable_outside_private_network,
                "name": plan.name,
                "key": format!("{}:{}", plan.service_name, plan.name),
                "price": {
                    "cents": plan.cost_cents,
                    "unit": plan.cost_unit,
                },
                "compliance": [],
                "space_default": false,
                "state": plan.state().as_str(),
                "attributes": plan.attributes,
                "updated_at": plan.updated,
                "engine": {
                    "type": plan.engine_type,
                    "version": plan.engine_version,
                },
            }),
        }
    }
}
