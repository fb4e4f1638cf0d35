use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use trackeame_core::store::CarrierStore;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::carrier::CarrierResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(list_carriers, get_carrier), components(schemas(CarrierResponse)))]
pub struct CarriersApi;

/// Register carrier routes. Carriers are seeded, never created over HTTP.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/carriers", get(list_carriers))
        .route("/carriers/{slug}", get(get_carrier))
}

#[utoipa::path(
    get,
    path = "/v1/carriers",
    tag = "carriers",
    responses(
        (status = 200, description = "Known carriers", body = Vec<CarrierResponse>),
    )
)]
pub async fn list_carriers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<CarrierResponse>>, ServerError> {
    let adapters = state.pipeline.adapters();
    let carriers = state.store().list_carriers().await?;
    Ok(Json(
        carriers
            .into_iter()
            .map(|c| {
                let supported = adapters.get(&c.slug).is_some();
                CarrierResponse::new(c, supported)
            })
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/carriers/{slug}",
    tag = "carriers",
    responses(
        (status = 200, description = "Carrier", body = CarrierResponse),
        (status = 404, description = "Unknown carrier"),
    )
)]
pub async fn get_carrier(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<CarrierResponse>, ServerError> {
    let carrier = state
        .store()
        .get_carrier_by_slug(&slug)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("carrier {slug} not found")))?;
    let supported = state.pipeline.adapters().get(&carrier.slug).is_some();
    Ok(Json(CarrierResponse::new(carrier, supported)))
}
