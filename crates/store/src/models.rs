//! Database models mapping to the broker schema.

use basin_core::plan::{Plan, ProviderKind};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Catalog service record.
#[derive(Debug, Clone, FromRow)]
pub struct ServiceRow {
    pub service: Uuid,
    pub name: String,
    pub human_name: String,
    pub description: String,
    pub categories: String,
    pub image: String,
    pub beta: bool,
    pub deprecated: bool,
    pub created: OffsetDateTime,
    pub updated: OffsetDateTime,
}

/// Catalog plan record, joined with its service name.
#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub plan: Uuid,
    pub service: Uuid,
    pub service_name: String,
    pub name: String,
    pub human_name: String,
    pub description: String,
    pub version: String,
    #[sqlx(rename = "type")]
    pub engine_type: String,
    pub scheme: String,
    pub categories: String,
    pub cost_cents: i32,
    pub cost_unit: String,
    pub attributes: String,
    pub provider: String,
    pub provider_private_details: String,
    pub installable_inside_private_network: bool,
    pub installable_outside_private_network: bool,
    pub supports_multiple_installations: bool,
    pub supports_sharing: bool,
    pub preprovision: i32,
    pub beta: bool,
    pub deprecated: bool,
    pub created: OffsetDateTime,
    pub updated: OffsetDateTime,
}

impl PlanRow {
    /// Resolve the row into the domain plan: parse the provider tag, decode
    /// the attributes blob, and apply environment interpolation to the
    /// provider-private details.
    pub fn into_plan(self) -> Plan {
        let attributes =
            serde_json::from_str(&self.attributes).unwrap_or(serde_json::Value::Null);
        Plan {
            id: self.plan,
            service_id: self.service,
            service_name: self.service_name,
            name: self.name,
            human_name: self.human_name,
            description: self.description,
            engine_version: self.version,
            engine_type: self.engine_type,
            scheme: self.scheme,
            categories: self.categories,
            cost_cents: self.cost_cents,
            cost_unit: self.cost_unit,
            attributes,
            provider: ProviderKind::parse(&self.provider),
            provider_private_details: expand_env(&self.provider_private_details),
            preprovision: self.preprovision,
            installable_inside_private_network: self.installable_inside_private_network,
            installable_outside_private_network: self.installable_outside_private_network,
            supports_multiple_installations: self.supports_multiple_installations,
            supports_sharing: self.supports_sharing,
            beta: self.beta,
            deprecated: self.deprecated,
            created: self.created,
            updated: self.updated,
        }
    }
}

/// A resource row as seen by the request handlers: the stored fields plus a
/// count of currently-started tasks referencing it.
#[derive(Debug, Clone, FromRow)]
pub struct InstanceEntry {
    pub id: String,
    pub name: String,
    pub plan: Uuid,
    pub claimed: bool,
    pub status: String,
    pub username: String,
    pub password: String,
    pub endpoint: String,
    pub started_tasks: i64,
}

/// A freshly inserted pool row awaiting backend provisioning.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub id: String,
    pub plan: Uuid,
}

/// Durable task record.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub task: Uuid,
    pub resource: String,
    pub action: String,
    pub status: String,
    pub retries: i32,
    pub metadata: String,
    pub result: String,
    pub created: OffsetDateTime,
    pub updated: OffsetDateTime,
    pub started: Option<OffsetDateTime>,
    pub finished: Option<OffsetDateTime>,
    pub deleted: bool,
}

/// Partial task update. Unset fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<String>,
    pub retries: Option<i32>,
    pub metadata: Option<String>,
    pub result: Option<String>,
    pub started: Option<OffsetDateTime>,
    pub finished: Option<OffsetDateTime>,
}

/// Expand `${VAR}` and `$VAR` references against the process environment.
/// Unset variables expand to the empty string.
///
/// Applied to provider-private details at read time so seeded catalog rows
/// can reference deployment secrets (e.g. `${AWS_KMS_KEY_ID}`) without
/// storing them.
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if closed {
                    out.push_str(&std::env::var(&name).unwrap_or_default());
                } else {
                    out.push_str("${");
                    out.push_str(&name);
                }
            }
            Some(c) if c.is_ascii_alphanumeric() || *c == '_' => {
                let mut name = String::new();
                while let Some(c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&std::env::var(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }
    out
}
