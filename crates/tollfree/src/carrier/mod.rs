//! Adapter over the carrier's HTTP API plus inbound webhook signature checks.

pub mod account;
pub mod campaign;
pub mod signature;
pub mod status;
pub mod surge;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::{Business, OnboardingProfile, PurchasedNumber, VerificationStatus};

pub use account::{AccountStrategy, SharedAccount, SubAccountPerBusiness};
pub use campaign::CampaignRequest;
pub use signature::{sign_payload, verify_signature, SIGNATURE_HEADER};
pub use status::map_vendor_status;
pub use surge::{SurgeApi, SurgeCarrier};

/// Result of a compliance campaign submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSubmission {
    pub verification_id: String,
    pub status: VerificationStatus,
}

/// Toll-free messaging capability as reported by the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityStatus {
    pub status: VerificationStatus,
    pub vendor_status: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundSms {
    pub from: String,
    pub to: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: String,
    pub status: String,
}

/// Operations the provisioning, webhook, and reconciliation workflows need from a carrier.
#[async_trait]
pub trait CarrierGateway: Send + Sync {
    /// Account to provision under; shared or per-business depending on construction.
    async fn resolve_account(
        &self,
        business: &Business,
        profile: &OnboardingProfile,
    ) -> Result<String, CarrierError>;
    async fn purchase_number(&self, account_id: &str) -> Result<PurchasedNumber, CarrierError>;
    async fn submit_verification(
        &self,
        account_id: &str,
        campaign: &CampaignRequest,
    ) -> Result<VerificationSubmission, CarrierError>;
    async fn capability_status(&self, account_id: &str) -> Result<CapabilityStatus, CarrierError>;
    async fn send_message(
        &self,
        account_id: &str,
        message: &OutboundSms,
    ) -> Result<SentMessage, CarrierError>;
}

/// Error raised by the carrier adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CarrierError {
    /// The carrier answered with a non-success status; the body is kept verbatim.
    #[error("carrier rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("carrier unreachable: {0}")]
    Transport(String),
    #[error("unexpected carrier response: {0}")]
    InvalidResponse(String),
    #[error("shared carrier account id is not configured")]
    MissingMasterAccount,
    #[error("carrier client misconfigured: {0}")]
    Configuration(String),
}
