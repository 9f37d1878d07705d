//! Core domain types and shared logic for the Basin service broker.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Plans, provider kinds, and the seeded catalog identifiers
//! - Provisioned instances and IAM credentials
//! - The resource status vocabulary and its classification predicates
//! - Task actions, statuses, and per-action metadata shapes
//! - Application configuration

pub mod config;
pub mod instance;
pub mod plan;
pub mod status;
pub mod task;

pub use config::AppConfig;
pub use instance::{Instance, User};
pub use plan::{Plan, ProviderKind};
pub use task::{TaskAction, TaskStatus};

/// Owner recorded on buckets created by the preprovisioning loop.
pub const PREPROVISIONED_OWNER: &str = "preprovisioned";
