//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::routing::{get, put};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v2/catalog", get(handlers::get_catalog))
        .route(
            "/v2/service_instances/{instance_id}",
            put(handlers::provision)
                .delete(handlers::deprovision)
                .patch(handlers::update),
        )
        .route(
            "/v2/service_instances/{instance_id}/last_operation",
            get(handlers::last_operation),
        )
        .route(
            "/v2/service_instances/{instance_id}/service_bindings/{binding_id}",
            put(handlers::bind)
                .delete(handlers::unbind)
                .get(handlers::get_binding),
        )
        .route(
            "/v2/service_instances/{instance_id}/actions/rotate_credentials",
            put(handlers::rotate_credentials),
        )
        // Intentionally unauthenticated for load balancers/k8s probes.
        .route("/healthz", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
