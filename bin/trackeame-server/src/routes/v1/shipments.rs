use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;
use trackeame_core::store::{EventStore, ShipmentStore};
use utoipa::OpenApi;
use validator::Validate;

use crate::error::ServerError;
use crate::middleware::user::Caller;
use crate::schemas::shipment::{
    CreateShipmentRequest, EventResponse, PageQuery, ShipmentCarrier, ShipmentPage, ShipmentResponse,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(create_shipment, list_shipments, get_shipment, list_shipment_events),
    components(schemas(
        CreateShipmentRequest,
        ShipmentResponse,
        ShipmentCarrier,
        ShipmentPage,
        EventResponse
    ))
)]
pub struct ShipmentsApi;

/// Register shipment routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shipments", get(list_shipments).post(create_shipment))
        .route("/shipments/{id}", get(get_shipment))
        .route("/shipments/{id}/events", get(list_shipment_events))
}

/// Register a tracking code for the caller. Events arrive asynchronously.
#[utoipa::path(
    post,
    path = "/v1/shipments",
    tag = "shipments",
    request_body = CreateShipmentRequest,
    responses(
        (status = 201, description = "Shipment registered; first fetch queued", body = ShipmentResponse),
        (status = 400, description = "Malformed tracking code"),
        (status = 401, description = "Missing caller identity"),
        (status = 404, description = "Unknown carrier"),
        (status = 409, description = "Already registered by this user"),
        (status = 422, description = "Carrier not supported yet"),
    )
)]
pub async fn create_shipment(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CreateShipmentRequest>,
) -> Result<(StatusCode, Json<ShipmentResponse>), ServerError> {
    req.validate()?;
    let user = caller.user()?;
    let tracked = state
        .pipeline
        .register(&user, req.carrier_slug.trim(), &req.tracking_code)
        .await?;
    info!(shipment_id = %tracked.shipment.id, "shipment created");
    Ok((StatusCode::CREATED, Json(tracked.into())))
}

#[utoipa::path(
    get,
    path = "/v1/shipments",
    tag = "shipments",
    params(PageQuery),
    responses(
        (status = 200, description = "Caller's shipments, newest first", body = ShipmentPage),
        (status = 401, description = "Missing caller identity"),
    )
)]
pub async fn list_shipments(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Result<Json<ShipmentPage>, ServerError> {
    let store = state.store();
    let shipments = store
        .list_user_shipments(&caller.id, query.limit(), query.offset())
        .await?;
    let total = store.count_user_shipments(&caller.id).await?;
    Ok(Json(ShipmentPage {
        shipments: shipments.into_iter().map(Into::into).collect(),
        total,
        limit: query.limit(),
        page: query.page(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/shipments/{id}",
    tag = "shipments",
    responses(
        (status = 200, description = "Shipment", body = ShipmentResponse),
        (status = 404, description = "No such shipment for this caller"),
    )
)]
pub async fn get_shipment(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ShipmentResponse>, ServerError> {
    let tracked = state
        .store()
        .get_user_shipment(&caller.id, &id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("shipment {id} not found")))?;
    Ok(Json(tracked.into()))
}

#[utoipa::path(
    get,
    path = "/v1/shipments/{id}/events",
    tag = "shipments",
    responses(
        (status = 200, description = "Tracking events, newest first", body = Vec<EventResponse>),
        (status = 404, description = "No such shipment for this caller"),
    )
)]
pub async fn list_shipment_events(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventResponse>>, ServerError> {
    let store = state.store();
    if store.get_user_shipment(&caller.id, &id).await?.is_none() {
        return Err(ServerError::NotFound(format!("shipment {id} not found")));
    }
    let events = store.list_events(&id).await?;
    Ok(Json(events.into_iter().map(Into::into).collect()))
}
