use crate::infra::{AppState, Engine};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use tollfree::auth::AccessControl;
use tollfree::messaging::messaging_router;
use tollfree::provisioning::provisioning_router;
use tollfree::queue::queue_router;
use tollfree::reconcile::reconcile_router;
use tollfree::webhooks::{webhook_router, WebhookSettings};
use tollfree::{CarrierGateway, Store};

pub(crate) fn with_tollfree_routes<S, C>(
    engine: &Engine<S, C>,
    access: AccessControl,
    webhook_settings: WebhookSettings,
) -> axum::Router
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    webhook_router(engine.webhooks.clone(), webhook_settings)
        .merge(provisioning_router(
            engine.provisioning.clone(),
            access.clone(),
        ))
        .merge(queue_router(engine.drain.clone(), access.clone()))
        .merge(reconcile_router(engine.reconciler.clone(), access.clone()))
        .merge(messaging_router(engine.messenger.clone(), access))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tollfree::auth::StaticOwnerDirectory;
    use tollfree::carrier::{SharedAccount, SurgeApi, SurgeCarrier};
    use tollfree::config::ProvisioningConfig;
    use tollfree::InMemoryStore;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let api = SurgeApi::new(
            "http://127.0.0.1:9".parse().expect("url"),
            "test-key",
            1,
        )
        .expect("client");
        let carrier = Arc::new(SurgeCarrier::new(
            api,
            Box::new(SharedAccount::new(Some("acct-master".to_string()))),
        ));
        let engine = Engine::new(
            Arc::new(InMemoryStore::new()),
            carrier,
            &ProvisioningConfig::default(),
        );
        let access = AccessControl::new(Arc::new(StaticOwnerDirectory::default()), None, None);
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        state.readiness.store(ready, Ordering::Release);

        with_tollfree_routes(&engine, access, WebhookSettings::default()).layer(Extension(state))
    }

    async fn status_of(router: axum::Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response")
            .status()
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        assert_eq!(status_of(app(false), "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_flag() {
        assert_eq!(
            status_of(app(false), "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(app(true), "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn library_routes_are_mounted() {
        assert_eq!(
            status_of(app(true), "/api/numbers/capacity").await,
            StatusCode::OK
        );
        assert_eq!(
            status_of(app(true), "/api/webhooks/carrier").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
