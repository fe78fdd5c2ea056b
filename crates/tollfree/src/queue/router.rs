use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::error;

use super::{DrainError, QueueDrainWorker};
use crate::auth::AccessControl;
use crate::carrier::CarrierGateway;
use crate::error::json_error;
use crate::store::Store;

struct RouteState<S, C> {
    worker: Arc<QueueDrainWorker<S, C>>,
    access: AccessControl,
}

impl<S, C> Clone for RouteState<S, C> {
    fn clone(&self) -> Self {
        Self {
            worker: Arc::clone(&self.worker),
            access: self.access.clone(),
        }
    }
}

/// Operator endpoint that drains the provisioning queue.
pub fn queue_router<S, C>(worker: Arc<QueueDrainWorker<S, C>>, access: AccessControl) -> Router
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    Router::new()
        .route("/api/numbers/queue/drain", post(drain_handler::<S, C>))
        .with_state(RouteState { worker, access })
}

async fn drain_handler<S, C>(State(state): State<RouteState<S, C>>, headers: HeaderMap) -> Response
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    if let Err(denied) = state.access.authorize_admin(&headers) {
        return denied.into_response();
    }

    match state.worker.drain().await {
        Ok(report) => {
            let payload = json!({
                "success": true,
                "drained": report.drained,
                "attempted": report.attempted,
                "failed": report.failed,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(DrainError::AlreadyRunning) => {
            json_error(StatusCode::CONFLICT, DrainError::AlreadyRunning.to_string())
        }
        Err(DrainError::Store(err)) => {
            error!(error = %err, "queue drain aborted");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}
