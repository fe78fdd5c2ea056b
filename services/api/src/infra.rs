use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tollfree::config::ProvisioningConfig;
use tollfree::messaging::OutboundMessenger;
use tollfree::provisioning::ProvisioningService;
use tollfree::queue::QueueDrainWorker;
use tollfree::reconcile::StatusReconciler;
use tollfree::store::{Business, BusinessId};
use tollfree::webhooks::WebhookProcessor;
use tollfree::{CarrierGateway, Store};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Workflow services sharing one store and one carrier client.
pub(crate) struct Engine<S, C> {
    pub(crate) provisioning: Arc<ProvisioningService<S, C>>,
    pub(crate) drain: Arc<QueueDrainWorker<S, C>>,
    pub(crate) reconciler: Arc<StatusReconciler<S, C>>,
    pub(crate) webhooks: Arc<WebhookProcessor<S, C>>,
    pub(crate) messenger: Arc<OutboundMessenger<S, C>>,
}

impl<S, C> Engine<S, C>
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    pub(crate) fn new(store: Arc<S>, carrier: Arc<C>, settings: &ProvisioningConfig) -> Self {
        Self {
            provisioning: Arc::new(ProvisioningService::new(
                Arc::clone(&store),
                Arc::clone(&carrier),
                settings.clone(),
            )),
            drain: Arc::new(QueueDrainWorker::new(
                Arc::clone(&store),
                Arc::clone(&carrier),
                settings.clone(),
            )),
            reconciler: Arc::new(StatusReconciler::new(
                Arc::clone(&store),
                Arc::clone(&carrier),
                settings.reconcile_batch_size,
            )),
            webhooks: Arc::new(WebhookProcessor::new(Arc::clone(&store), Arc::clone(&carrier))),
            messenger: Arc::new(OutboundMessenger::new(store, carrier)),
        }
    }
}

/// Business row as listed in a seed file.
#[derive(Debug, Deserialize)]
pub(crate) struct SeedBusiness {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) carrier_account_id: Option<String>,
    #[serde(default)]
    pub(crate) from_number: Option<String>,
}

impl From<SeedBusiness> for Business {
    fn from(seed: SeedBusiness) -> Self {
        let mut business = Business::new(BusinessId::new(seed.id), seed.name);
        business.carrier_account_id = seed.carrier_account_id;
        business.from_number = seed.from_number;
        business
    }
}

pub(crate) fn parse_seed_businesses(raw: &str) -> Result<Vec<Business>, serde_json::Error> {
    let seeds: Vec<SeedBusiness> = serde_json::from_str(raw)?;
    Ok(seeds.into_iter().map(Business::from).collect())
}

pub(crate) fn load_seed_businesses(path: &Path) -> Result<Vec<Business>, std::io::Error> {
    let raw = std::fs::read_to_string(path)?;
    Ok(parse_seed_businesses(&raw)?)
}
