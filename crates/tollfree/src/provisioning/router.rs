use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::service::{ProvisionOutcome, ProvisioningService};
use super::validation::BusinessInfo;
use super::ProvisioningError;
use crate::auth::AccessControl;
use crate::carrier::CarrierGateway;
use crate::error::{carrier_failure, json_error};
use crate::store::{BusinessId, Store, StoreError};

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    #[serde(alias = "businessId")]
    pub business_id: String,
    #[serde(alias = "businessInfo", default)]
    pub business_info: BusinessInfo,
}

struct RouteState<S, C> {
    service: Arc<ProvisioningService<S, C>>,
    access: AccessControl,
}

impl<S, C> Clone for RouteState<S, C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            access: self.access.clone(),
        }
    }
}

/// Capacity, provisioning, status, and resubmission endpoints.
pub fn provisioning_router<S, C>(
    service: Arc<ProvisioningService<S, C>>,
    access: AccessControl,
) -> Router
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    Router::new()
        .route("/api/numbers/capacity", get(capacity_handler::<S, C>))
        .route("/api/numbers/provision", post(provision_handler::<S, C>))
        .route(
            "/api/numbers/status/:business_id",
            get(status_handler::<S, C>),
        )
        .route(
            "/api/numbers/verification/resubmit",
            post(resubmit_handler::<S, C>),
        )
        .with_state(RouteState { service, access })
}

async fn capacity_handler<S, C>(State(state): State<RouteState<S, C>>) -> Response
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    match state.service.capacity() {
        Ok(capacity) => {
            let payload = json!({
                "success": true,
                "in_use": capacity.in_use,
                "max": capacity.max,
                "queued": capacity.queued,
                "unlimited": capacity.unlimited,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(other) => provisioning_failure(other),
    }
}

async fn provision_handler<S, C>(
    State(state): State<RouteState<S, C>>,
    headers: HeaderMap,
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Response
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return json_error(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text()),
    };
    let business_id = BusinessId::new(request.business_id);
    if let Err(denied) = state.access.authorize_owner(&headers, &business_id) {
        return denied.into_response();
    }

    match state.service.provision(&business_id, &request.business_info).await {
        Ok(ProvisionOutcome::Provisioned(number)) => {
            let payload = json!({
                "success": true,
                "from_number": number.from_number,
                "status": number.status.label(),
                "verification_id": number.verification_id,
                "message": "Toll-free number provisioned; verification submitted",
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Ok(ProvisionOutcome::Queued { queue_item_id }) => {
            let payload = json!({
                "queued": true,
                "queue_item_id": queue_item_id,
                "message": "Number capacity reached; your request is queued and will be provisioned when a slot frees up",
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(other) => provisioning_failure(other),
    }
}

async fn status_handler<S, C>(
    State(state): State<RouteState<S, C>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
) -> Response
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    let business_id = BusinessId::new(business_id);
    if let Err(denied) = state.access.authorize_owner(&headers, &business_id) {
        return denied.into_response();
    }

    match state.service.check_status(&business_id).await {
        Ok(report) => {
            let payload = json!({
                "success": true,
                "status": report.status.label(),
                "details": report.details,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(other) => provisioning_failure(other),
    }
}

async fn resubmit_handler<S, C>(
    State(state): State<RouteState<S, C>>,
    headers: HeaderMap,
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Response
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return json_error(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text()),
    };
    let business_id = BusinessId::new(request.business_id);
    if let Err(denied) = state.access.authorize_owner(&headers, &business_id) {
        return denied.into_response();
    }

    match state.service.resubmit(&business_id, &request.business_info).await {
        Ok(submission) => {
            let payload = json!({
                "success": true,
                "status": submission.status.label(),
                "verification_id": submission.verification_id,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(other) => provisioning_failure(other),
    }
}

pub(crate) fn provisioning_failure(err: ProvisioningError) -> Response {
    match err {
        ProvisioningError::Validation(validation) => {
            let payload = json!({
                "error": validation.to_string(),
                "fields": validation.fields,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        ProvisioningError::BusinessNotFound(_) | ProvisioningError::Store(StoreError::NotFound) => {
            json_error(StatusCode::NOT_FOUND, err.to_string())
        }
        ProvisioningError::AlreadyProvisioned { .. }
        | ProvisioningError::NotProvisioned
        | ProvisioningError::MissingOnboarding
        | ProvisioningError::InProgress
        | ProvisioningError::Store(StoreError::Conflict) => {
            json_error(StatusCode::CONFLICT, err.to_string())
        }
        ProvisioningError::Carrier(carrier) => carrier_failure(&carrier),
        ProvisioningError::Store(other) => {
            error!(error = %other, "provisioning store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}
