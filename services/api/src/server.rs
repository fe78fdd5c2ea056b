use crate::cli::ServeArgs;
use crate::infra::{load_seed_businesses, AppState, Engine};
use crate::routes::with_tollfree_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tollfree::auth::AccessControl;
use tollfree::config::AppConfig;
use tollfree::error::AppError;
use tollfree::reconcile::StatusReconciler;
use tollfree::telemetry;
use tollfree::webhooks::WebhookSettings;
use tollfree::{CarrierGateway, InMemoryStore, Store, SurgeCarrier};
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = match args.seed_businesses.take() {
        Some(path) => {
            let businesses = load_seed_businesses(&path)?;
            info!(count = businesses.len(), path = %path.display(), "seeded businesses");
            Arc::new(InMemoryStore::with_businesses(businesses))
        }
        None => Arc::new(InMemoryStore::new()),
    };
    let carrier = Arc::new(SurgeCarrier::from_config(&config.carrier)?);
    if config.carrier.webhook_secret.is_none() {
        warn!("SURGE_WEBHOOK_SECRET is not set; carrier webhooks will be rejected");
    }

    let engine = Engine::new(store, carrier, &config.provisioning);
    spawn_reconciler(
        engine.reconciler.clone(),
        config.provisioning.reconcile_interval_secs,
    );

    let app = with_tollfree_routes(
        &engine,
        AccessControl::from_config(&config.access),
        WebhookSettings::from_config(&config.carrier),
    )
    .layer(Extension(app_state))
    .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        max_numbers = config.provisioning.max_numbers,
        "toll-free provisioning service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_reconciler<S, C>(reconciler: Arc<StatusReconciler<S, C>>, interval_secs: u64)
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    if interval_secs == 0 {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        // The first tick fires immediately; let the server settle first.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = reconciler.run().await {
                warn!(error = %err, "scheduled status reconciliation failed");
            }
        }
    });
    info!(interval_secs, "status reconciler scheduled");
}
