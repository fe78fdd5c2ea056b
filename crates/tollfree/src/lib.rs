//! Toll-free SMS number provisioning and carrier lifecycle engine.
//!
//! The crate wires a carrier API adapter, the STOP/HELP compliance engine, webhook
//! ingestion, the provisioning workflow with its capacity guard, the provisioning
//! queue drain, and the verification status reconciler around an abstract store.

pub mod auth;
pub mod carrier;
pub mod compliance;
pub mod config;
pub mod error;
pub mod messaging;
pub mod provisioning;
pub mod queue;
pub mod reconcile;
pub mod store;
pub mod telemetry;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod testing;

pub use carrier::{CarrierError, CarrierGateway, SurgeCarrier};
pub use config::AppConfig;
pub use store::{InMemoryStore, Store};
