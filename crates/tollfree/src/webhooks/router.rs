use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, warn};

use super::event::WebhookEnvelope;
use super::handlers::WebhookProcessor;
use crate::carrier::signature::{is_fresh, signature_timestamp, verify_signature};
use crate::carrier::CarrierGateway;
use crate::config::CarrierConfig;
use crate::store::Store;

/// Signature settings for the webhook endpoint.
#[derive(Clone, Default)]
pub struct WebhookSettings {
    pub signing_secret: Option<String>,
    /// Zero disables the timestamp freshness check.
    pub tolerance_secs: u64,
}

impl WebhookSettings {
    pub fn from_config(config: &CarrierConfig) -> Self {
        Self {
            signing_secret: config.webhook_secret.clone(),
            tolerance_secs: config.signature_tolerance_secs,
        }
    }
}

impl std::fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "<redacted>"))
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

struct RouteState<S, C> {
    processor: Arc<WebhookProcessor<S, C>>,
    settings: WebhookSettings,
}

impl<S, C> Clone for RouteState<S, C> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            settings: self.settings.clone(),
        }
    }
}

/// Carrier callback endpoint.
pub fn webhook_router<S, C>(processor: Arc<WebhookProcessor<S, C>>, settings: WebhookSettings) -> Router
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    Router::new()
        .route("/api/webhooks/carrier", post(webhook_handler::<S, C>))
        .with_state(RouteState {
            processor,
            settings,
        })
}

fn rejected(message: &str) -> Response {
    let payload = json!({ "success": false, "error": message });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

fn acknowledged(error: Option<String>) -> Response {
    let payload = match error {
        None => json!({ "success": true }),
        Some(error) => json!({ "success": false, "error": error }),
    };
    (StatusCode::OK, Json(payload)).into_response()
}

async fn webhook_handler<S, C>(
    State(state): State<RouteState<S, C>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    let Some(secret) = state.settings.signing_secret.as_deref() else {
        error!("webhook signing secret is not configured, rejecting callback");
        return rejected("webhook signing secret not configured");
    };
    if !verify_signature(&headers, &body, secret) {
        warn!("webhook signature verification failed");
        return rejected("invalid signature");
    }
    let timestamp = signature_timestamp(&headers).unwrap_or_default();
    if !is_fresh(timestamp, Utc::now().timestamp(), state.settings.tolerance_secs) {
        warn!(timestamp, "webhook signature timestamp outside tolerance");
        return rejected("stale signature");
    }

    let envelope = match WebhookEnvelope::parse(&body) {
        Ok(envelope) => envelope,
        Err(err) => {
            error!(error = %err, "webhook body could not be parsed");
            return acknowledged(Some(format!("invalid payload: {err}")));
        }
    };
    let event_type = envelope.event_type.clone().unwrap_or_default();

    match state.processor.handle(&envelope).await {
        Ok(outcome) => {
            debug!(event_type = %event_type, ?outcome, "webhook processed");
            acknowledged(None)
        }
        Err(err) => {
            error!(event_type = %event_type, error = %err, "webhook handler failed");
            acknowledged(Some(err.to_string()))
        }
    }
}
