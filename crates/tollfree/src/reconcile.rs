//! Periodic reconciliation of pending verifications against the carrier.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::auth::AccessControl;
use crate::carrier::CarrierGateway;
use crate::error::json_error;
use crate::store::{Store, StoreError, VerificationStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub updated: usize,
}

pub struct StatusReconciler<S, C> {
    store: Arc<S>,
    carrier: Arc<C>,
    batch_size: usize,
}

impl<S, C> StatusReconciler<S, C>
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    pub fn new(store: Arc<S>, carrier: Arc<C>, batch_size: usize) -> Self {
        Self {
            store,
            carrier,
            batch_size: batch_size.max(1),
        }
    }

    /// Poll every pending business (up to the batch size) and persist status changes.
    ///
    /// Carrier or store failures for one business are logged and skipped.
    pub async fn run(&self) -> Result<ReconcileReport, StoreError> {
        let pending = self
            .store
            .businesses_with_status(VerificationStatus::Pending, self.batch_size)?;

        let mut report = ReconcileReport::default();
        for business in pending {
            let Some(account_id) = business.carrier_account_id.as_deref() else {
                continue;
            };
            report.checked += 1;

            let live = match self.carrier.capability_status(account_id).await {
                Ok(live) => live,
                Err(err) => {
                    warn!(business_id = %business.id, account_id, error = %err, "status poll failed");
                    continue;
                }
            };
            if live.status == business.verification_status {
                continue;
            }

            match self
                .store
                .update_verification_status(&business.id, live.status, live.details.as_deref())
            {
                Ok(()) => {
                    report.updated += 1;
                    info!(
                        business_id = %business.id,
                        account_id,
                        status = live.status.label(),
                        "verification status reconciled"
                    );
                }
                Err(err) => {
                    warn!(business_id = %business.id, error = %err, "failed to persist reconciled status");
                }
            }
        }

        info!(checked = report.checked, updated = report.updated, "status reconciliation finished");
        Ok(report)
    }
}

struct RouteState<S, C> {
    reconciler: Arc<StatusReconciler<S, C>>,
    access: AccessControl,
}

impl<S, C> Clone for RouteState<S, C> {
    fn clone(&self) -> Self {
        Self {
            reconciler: Arc::clone(&self.reconciler),
            access: self.access.clone(),
        }
    }
}

/// Scheduler-facing poll endpoint.
pub fn reconcile_router<S, C>(
    reconciler: Arc<StatusReconciler<S, C>>,
    access: AccessControl,
) -> Router
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    Router::new()
        .route("/api/numbers/status/poll", post(poll_handler::<S, C>))
        .with_state(RouteState { reconciler, access })
}

async fn poll_handler<S, C>(State(state): State<RouteState<S, C>>, headers: HeaderMap) -> Response
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    if let Err(denied) = state.access.authorize_scheduler(&headers) {
        return denied.into_response();
    }

    match state.reconciler.run().await {
        Ok(report) => {
            let payload = json!({
                "success": true,
                "checked": report.checked,
                "updated": report.updated,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => {
            error!(error = %err, "status reconciliation aborted");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}
