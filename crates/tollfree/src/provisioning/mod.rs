//! Toll-free number provisioning: validation, the capacity guard, and the
//! account → number → verification workflow shared with the queue drain.

pub mod router;
pub mod service;
pub mod validation;
pub(crate) mod workflow;

use crate::carrier::CarrierError;
use crate::store::{BusinessId, StoreError};

pub use router::provisioning_router;
pub use service::{CapacitySnapshot, ProvisionOutcome, ProvisioningService, StatusReport};
pub use validation::{validate_business_info, AddressInput, BusinessInfo, FieldError, ValidationError};
pub use workflow::ProvisionedNumber;

/// Failures surfaced by provisioning, resubmission, and status checks.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("business {0} not found")]
    BusinessNotFound(BusinessId),
    #[error("business already has number {from_number}")]
    AlreadyProvisioned { from_number: String },
    #[error("business has no toll-free number yet")]
    NotProvisioned,
    #[error("business has no saved onboarding details")]
    MissingOnboarding,
    #[error("provisioning is already running for this business")]
    InProgress,
    #[error(transparent)]
    Carrier(#[from] CarrierError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
