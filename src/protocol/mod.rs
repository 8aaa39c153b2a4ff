//! The network-driver remote API: a JSON-over-HTTP protocol served on a
//! UNIX socket, with one route per RPC and a shared `State<Arc<Coordinator>>`.

pub mod types;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use serde_json::json;

use crate::coordinator::Coordinator;
use crate::error::DriverResult;
use types::*;

pub type SharedCoordinator = Arc<Coordinator>;

/// Builds the full router: `Plugin.Activate` for the engine's
/// plugin-discovery handshake, `NetworkDriver.*` for the RPCs in §4.1, and
/// a fallback that renders unknown routes as the engine's own "API not
/// found" error shape.
pub fn router(coordinator: SharedCoordinator) -> Router {
    Router::new()
        .route("/Plugin.Activate", post(activate))
        .route("/NetworkDriver.GetCapabilities", post(get_capabilities))
        .route("/NetworkDriver.CreateNetwork", post(create_network))
        .route("/NetworkDriver.DeleteNetwork", post(delete_network))
        .route("/NetworkDriver.CreateEndpoint", post(create_endpoint))
        .route("/NetworkDriver.EndpointOperInfo", post(endpoint_oper_info))
        .route("/NetworkDriver.DeleteEndpoint", post(delete_endpoint))
        .route("/NetworkDriver.Join", post(join))
        .route("/NetworkDriver.Leave", post(leave))
        .fallback(not_found)
        .with_state(coordinator)
}

async fn activate() -> Json<ActivateResponse> {
    Json(ActivateResponse::default())
}

async fn get_capabilities() -> Json<CapabilitiesResponse> {
    Json(CapabilitiesResponse::default())
}

async fn create_network(
    State(coordinator): State<SharedCoordinator>,
    Json(req): Json<CreateNetworkRequest>,
) -> impl IntoResponse {
    respond(coordinator.create_network(req).await)
}

async fn delete_network(
    State(coordinator): State<SharedCoordinator>,
    Json(req): Json<NetworkIdRequest>,
) -> impl IntoResponse {
    respond(coordinator.delete_network(req).await)
}

async fn create_endpoint(
    State(coordinator): State<SharedCoordinator>,
    Json(req): Json<CreateEndpointRequest>,
) -> impl IntoResponse {
    respond(coordinator.create_endpoint(req).await)
}

async fn endpoint_oper_info(
    State(coordinator): State<SharedCoordinator>,
    Json(req): Json<EndpointIdRequest>,
) -> impl IntoResponse {
    respond(coordinator.endpoint_oper_info(req).await)
}

async fn delete_endpoint(
    State(coordinator): State<SharedCoordinator>,
    Json(req): Json<EndpointIdRequest>,
) -> impl IntoResponse {
    respond(coordinator.delete_endpoint(req).await)
}

async fn join(
    State(coordinator): State<SharedCoordinator>,
    Json(req): Json<JoinRequest>,
) -> impl IntoResponse {
    respond(coordinator.join(req).await)
}

async fn leave(
    State(coordinator): State<SharedCoordinator>,
    Json(req): Json<EndpointIdRequest>,
) -> impl IntoResponse {
    respond(coordinator.leave(req).await)
}

/// Renders a handler's `DriverResult` as the engine's JSON envelope: the
/// success payload on `Ok`, `{"Err": ...}` with the matching HTTP status on
/// `Err` (`DriverError` already implements `IntoResponse` for that half).
fn respond<T: serde::Serialize>(result: DriverResult<T>) -> axum::response::Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"Err": "API not found"})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_response_names_network_driver() {
        let resp = ActivateResponse::default();
        assert_eq!(resp.implements, vec!["NetworkDriver"]);
    }
}
