use super::endpoint::EndpointHandle;
use super::protocol::*;
use super::types::ClientStatus;

use axum::routing::{get, post};
use axum::{Extension, Json, Router, http::StatusCode};

/// Routes masters use to reach this client, plus a status route.
pub fn router(handle: EndpointHandle) -> Router {
    Router::new()
        .route(ENDPOINT_REGISTERED_APPLICATION, post(handle_registered_application))
        .route(ENDPOINT_APPLICATION_REMOVED, post(handle_application_removed))
        .route(ENDPOINT_EXECUTOR_ADDED, post(handle_executor_added))
        .route(ENDPOINT_EXECUTOR_UPDATED, post(handle_executor_updated))
        .route(ENDPOINT_WORKER_REMOVED, post(handle_worker_removed))
        .route(ENDPOINT_MASTER_CHANGED, post(handle_master_changed))
        .route(ENDPOINT_STATUS, get(handle_status))
        .layer(Extension(handle))
}

fn deliver(handle: &EndpointHandle, message: ClientMessage) -> StatusCode {
    if handle.deliver(message) {
        StatusCode::OK
    } else {
        tracing::debug!("Dropping master message, client endpoint is stopped");
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn handle_registered_application(
    Extension(handle): Extension<EndpointHandle>,
    Json(req): Json<RegisteredApplication>,
) -> StatusCode {
    tracing::debug!("Master {} registered application {}", req.master, req.app_id);
    deliver(&handle, ClientMessage::RegisteredApplication(req))
}

pub async fn handle_application_removed(
    Extension(handle): Extension<EndpointHandle>,
    Json(req): Json<ApplicationRemoved>,
) -> StatusCode {
    deliver(&handle, ClientMessage::ApplicationRemoved(req))
}

pub async fn handle_executor_added(
    Extension(handle): Extension<EndpointHandle>,
    Json(req): Json<ExecutorAdded>,
) -> StatusCode {
    deliver(&handle, ClientMessage::ExecutorAdded(req))
}

pub async fn handle_executor_updated(
    Extension(handle): Extension<EndpointHandle>,
    Json(req): Json<ExecutorUpdated>,
) -> StatusCode {
    deliver(&handle, ClientMessage::ExecutorUpdated(req))
}

pub async fn handle_worker_removed(
    Extension(handle): Extension<EndpointHandle>,
    Json(req): Json<WorkerRemoved>,
) -> StatusCode {
    deliver(&handle, ClientMessage::WorkerRemoved(req))
}

pub async fn handle_master_changed(
    Extension(handle): Extension<EndpointHandle>,
    Json(req): Json<MasterChanged>,
) -> StatusCode {
    deliver(&handle, ClientMessage::MasterChanged(req))
}

pub async fn handle_status(
    Extension(handle): Extension<EndpointHandle>,
) -> (StatusCode, Json<Option<ClientStatus>>) {
    match handle.status().await {
        Some(status) => (StatusCode::OK, Json(Some(status))),
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(None)),
    }
}
