//! Plan and provider-kind types.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Cloud backend a plan is served by.
///
/// Stored as a plain varchar so new kinds can land without a schema change;
/// anything unrecognized parses to `Unknown` and is rejected at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    AwsS3,
    Unknown,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwsS3 => "aws-s3",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "aws-s3" => Self::AwsS3,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog lifecycle state surfaced in plan metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Ga,
    Beta,
    Deprecated,
}

impl PlanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ga => "ga",
            Self::Beta => "beta",
            Self::Deprecated => "deprecated",
        }
    }
}

/// A purchasable plan, fully resolved from the catalog.
///
/// `provider_private_details` holds backend-only settings (KMS key ids and
/// the like) with environment interpolation already applied. This struct
/// deliberately does not derive `Serialize`: the private details must never
/// cross the OSB boundary or appear in a webhook payload, and keeping the
/// type out of serde makes that a compile-time property.
#[derive(Debug, Clone)]
pub struct Plan {
    pub id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub name: String,
    pub human_name: String,
    pub description: String,
    pub engine_version: String,
    pub engine_type: String,
    pub scheme: String,
    pub categories: String,
    pub cost_cents: i32,
    pub cost_unit: String,
    pub attributes: serde_json::Value,
    pub provider: ProviderKind,
    pub provider_private_details: String,
    pub preprovision: i32,
    pub installable_inside_private_network: bool,
    pub installable_outside_private_network: bool,
    pub supports_multiple_installations: bool,
    pub supports_sharing: bool,
    pub beta: bool,
    pub deprecated: bool,
    pub created: OffsetDateTime,
    pub updated: OffsetDateTime,
}

impl Plan {
    /// Whether the plan is free of charge.
    pub fn free(&self) -> bool {
        self.cost_cents == 0
    }

    pub fn state(&self) -> PlanState {
        if self.deprecated {
            PlanState::Deprecated
        } else if self.beta {
            PlanState::Beta
        } else {
            PlanState::Ga
        }
    }
}
