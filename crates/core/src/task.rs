//! Durable task actions, statuses, and per-action metadata.

use serde::{Deserialize, Serialize};

/// The closed set of deferred-work actions the worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// Deprovision the backend resource and soft-delete the row.
    Delete,
    /// Refresh status from the backend once it changes.
    ResyncFromProvider,
    /// Refresh status from the backend until it reports available.
    ResyncUntilAvailable,
    /// POST the signed creation callback once the instance is available.
    NotifyCreateServiceWebhook,
    /// Reserved; no dispatcher branch yet.
    NotifyCreateBindingWebhook,
    /// Reserved; upgrades across providers are rejected until a
    /// backup/restore path exists.
    ChangeProviders,
    /// Upgrade to another plan within the same provider.
    ChangePlans,
    /// Reserved; only counted by restore-status checks.
    RestoreResource,
    /// Resync until available, then run the provider's post-provision hook.
    PerformPostProvision,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::ResyncFromProvider => "resync-from-provider",
            Self::ResyncUntilAvailable => "resync-until-available",
            Self::NotifyCreateServiceWebhook => "notify-create-service-webhook",
            Self::NotifyCreateBindingWebhook => "notify-create-binding-webhook",
            Self::ChangeProviders => "change-providers",
            Self::ChangePlans => "change-plans",
            Self::RestoreResource => "restore-database",
            Self::PerformPostProvision => "perform-post-provision",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "delete" => Some(Self::Delete),
            "resync-from-provider" => Some(Self::ResyncFromProvider),
            "resync-until-available" => Some(Self::ResyncUntilAvailable),
            "notify-create-service-webhook" => Some(Self::NotifyCreateServiceWebhook),
            "notify-create-binding-webhook" => Some(Self::NotifyCreateBindingWebhook),
            "change-providers" => Some(Self::ChangeProviders),
            "change-plans" => Some(Self::ChangePlans),
            "restore-database" => Some(Self::RestoreResource),
            "perform-post-provision" => Some(Self::PerformPostProvision),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle status; matches the `task_status` enum in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Started,
    Finished,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

/// Metadata for webhook notification tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTaskMetadata {
    pub url: String,
    pub secret: String,
}

/// Metadata for plan-change tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePlansTaskMetadata {
    pub plan: String,
}

/// Metadata for provider-change tasks (reserved).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeProvidersTaskMetadata {
    pub plan: String,
}

/// Metadata for restore tasks (reserved).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreTaskMetadata {
    pub backup: String,
}
