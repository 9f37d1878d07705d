//! Cloud provider capability for the Basin service broker.
//!
//! The `Provider` trait is the one variant point in the core: it owns all
//! cloud-side state (buckets, IAM users, keys, policies) and nothing
//! durable. One concrete backend exists today (`aws-s3`); the registry is
//! the extension point for more.

pub mod backends;
pub mod error;
pub mod registry;
pub mod traits;

pub use backends::AwsS3Provider;
pub use error::{ProviderError, ProviderResult};
pub use registry::ProviderRegistry;
pub use traits::{Provider, S3Settings};
