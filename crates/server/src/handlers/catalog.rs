//! Catalog endpoint.

use crate::error::ApiResult;
use crate::osb::{CatalogResponse, CatalogService};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use basin_store::repos::CatalogRepo;

/// GET /v2/catalog
pub async fn get_catalog(State(state): State<AppState>) -> ApiResult<Json<CatalogResponse>> {
    let mut services = Vec::new();
    for service in state.store.get_services().await? {
        let plans = state.store.get_plans(service.service).await?;
        services.push(CatalogService::from_rows(&service, &plans));
    }
    Ok(Json(CatalogResponse { services }))
}
