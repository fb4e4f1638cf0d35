pub mod carriers;
pub mod shipments;

use std::sync::Arc;

use axum::Router;
use utoipa::OpenApi;

use crate::state::AppState;

/// Routes nested under `/v1`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(shipments::router())
        .merge(carriers::router())
}

#[derive(OpenApi)]
#[openapi()]
pub struct V1Api;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = V1Api::openapi();
    spec.merge(shipments::ShipmentsApi::openapi());
    spec.merge(carriers::CarriersApi::openapi());
    spec
}
