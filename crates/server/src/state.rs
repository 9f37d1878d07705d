//! Application state shared across handlers and background loops.

use basin_core::config::AppConfig;
use basin_provider::ProviderRegistry;
use basin_store::BrokerStore;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Durable broker store; the single source of truth.
    pub store: Arc<dyn BrokerStore>,
    /// Provider backends by kind.
    pub providers: Arc<ProviderRegistry>,
    /// Process-wide mutex serialising the state-changing handlers.
    ///
    /// Provider calls can take minutes; holding one lock across them keeps
    /// the write path simple and correct at the cost of throughput.
    /// Read-only handlers (catalog, last-operation, get-binding) never take
    /// it.
    pub write_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn BrokerStore>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            providers,
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}
