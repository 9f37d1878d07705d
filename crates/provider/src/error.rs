//! Provider error types.

use thiserror::Error;

/// Cloud provider operation errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The plan the operation targets cannot support it; the caller may
    /// escalate to a cross-provider path.
    #[error("this feature is not available on this plan")]
    FeatureUnavailable,

    /// The backend cannot perform the operation at all.
    #[error("{0}")]
    Unsupported(String),

    #[error("no provider available for plan provider '{0}'")]
    UnknownProvider(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid provider settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("cloud API error: {0}")]
    Cloud(Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
