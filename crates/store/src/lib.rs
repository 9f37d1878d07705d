//! Durable relational store for the Basin service broker.
//!
//! This crate owns the broker's single source of truth:
//! - The service/plan catalog and its seeding
//! - Provisioned and pooled resources, including the atomic pool claim
//! - The durable task queue with its pending/started/finished lifecycle
//!
//! The schema is self-initialising: connecting runs an idempotent creation
//! script and seeds a default catalog when empty.

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use postgres::PostgresStore;
pub use store::BrokerStore;

use basin_core::config::DatabaseConfig;
use std::sync::Arc;

/// Connect to the configured database and return the broker store.
pub async fn from_config(config: &DatabaseConfig) -> StoreResult<Arc<dyn BrokerStore>> {
    let store = PostgresStore::from_url(&config.url, config.max_connections).await?;
    Ok(Arc::new(store) as Arc<dyn BrokerStore>)
}
