use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::validation::{validate_business_info, BusinessInfo};
use super::workflow::{purchase_and_submit, Claim, ProvisionedNumber, SlotClaim};
use super::ProvisioningError;
use crate::carrier::{CampaignRequest, CarrierGateway, VerificationSubmission};
use crate::config::ProvisioningConfig;
use crate::store::{Business, BusinessId, OnboardingProfile, Store, VerificationStatus};

/// Global toll-free number usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacitySnapshot {
    pub in_use: usize,
    pub max: usize,
    pub queued: usize,
    pub unlimited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Provisioned(ProvisionedNumber),
    /// Capacity was exhausted; the business waits in the provisioning queue.
    Queued { queue_item_id: u64 },
}

/// Live verification state returned by a status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: VerificationStatus,
    pub details: Option<String>,
    #[serde(skip)]
    pub changed: bool,
}

/// Service composing the record store, the carrier client, and the capacity guard.
pub struct ProvisioningService<S, C> {
    store: Arc<S>,
    carrier: Arc<C>,
    settings: ProvisioningConfig,
}

impl<S, C> ProvisioningService<S, C>
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    pub fn new(store: Arc<S>, carrier: Arc<C>, settings: ProvisioningConfig) -> Self {
        Self {
            store,
            carrier,
            settings,
        }
    }

    pub fn settings(&self) -> &ProvisioningConfig {
        &self.settings
    }

    pub fn capacity(&self) -> Result<CapacitySnapshot, ProvisioningError> {
        Ok(CapacitySnapshot {
            in_use: self.store.count_numbers_in_use()?,
            max: self.settings.max_numbers,
            queued: self.store.count_queued()?,
            unlimited: self.settings.unlimited(),
        })
    }

    /// Run the provisioning workflow for one business.
    pub async fn provision(
        &self,
        business_id: &BusinessId,
        info: &BusinessInfo,
    ) -> Result<ProvisionOutcome, ProvisioningError> {
        let profile = validate_business_info(info)?;
        let mut business = self.load(business_id)?;
        if business.is_fully_provisioned() {
            return Err(ProvisioningError::AlreadyProvisioned {
                from_number: business.from_number.unwrap_or_default(),
            });
        }

        let account_id = self.ensure_account(&mut business, &profile).await?;
        self.store.save_onboarding(business_id, &profile)?;

        let claim =
            match SlotClaim::acquire(self.store.as_ref(), business_id, self.settings.max_numbers)? {
                Claim::Held(claim) => claim,
                Claim::InFlight => return Err(ProvisioningError::InProgress),
                Claim::Exhausted { in_use, max } => {
                    let item = self.store.enqueue_provisioning(business_id, Utc::now())?;
                    info!(
                        business_id = %business_id,
                        in_use,
                        max,
                        queue_item_id = item.id,
                        "number capacity exhausted, provisioning queued"
                    );
                    return Ok(ProvisionOutcome::Queued {
                        queue_item_id: item.id,
                    });
                }
            };

        // A run that finished between the first read and the claim may have bought a number.
        let business = self.load(business_id)?;
        if business.is_fully_provisioned() {
            return Err(ProvisioningError::AlreadyProvisioned {
                from_number: business.from_number.unwrap_or_default(),
            });
        }

        let provisioned =
            purchase_and_submit(&claim, self.carrier.as_ref(), &business, &account_id, &profile)
                .await?;
        Ok(ProvisionOutcome::Provisioned(provisioned))
    }

    /// Submit a fresh compliance campaign for a business that already owns a number.
    pub async fn resubmit(
        &self,
        business_id: &BusinessId,
        info: &BusinessInfo,
    ) -> Result<VerificationSubmission, ProvisioningError> {
        let profile = validate_business_info(info)?;
        let business = self.load(business_id)?;
        let account_id = match (&business.carrier_account_id, &business.from_number) {
            (Some(account_id), Some(_)) => account_id.clone(),
            _ => return Err(ProvisioningError::NotProvisioned),
        };

        let campaign = CampaignRequest::from_profile(&profile);
        let submission = self
            .carrier
            .submit_verification(&account_id, &campaign)
            .await?;
        self.store
            .record_verification_submission(business_id, &submission.verification_id, &profile)?;

        info!(
            business_id = %business_id,
            previous_status = business.verification_status.label(),
            verification_id = %submission.verification_id,
            "verification resubmitted"
        );
        Ok(VerificationSubmission {
            verification_id: submission.verification_id,
            status: VerificationStatus::Pending,
        })
    }

    /// Query the carrier for the current verification state and persist any change.
    pub async fn check_status(
        &self,
        business_id: &BusinessId,
    ) -> Result<StatusReport, ProvisioningError> {
        let business = self.load(business_id)?;
        let Some(account_id) = business.carrier_account_id.as_deref() else {
            return Ok(StatusReport {
                status: business.verification_status,
                details: business.last_verification_error,
                changed: false,
            });
        };

        let live = self.carrier.capability_status(account_id).await?;
        let changed = live.status != business.verification_status
            || live.details != business.last_verification_error;
        if changed {
            self.store
                .update_verification_status(business_id, live.status, live.details.as_deref())?;
            info!(
                business_id = %business_id,
                from = business.verification_status.label(),
                to = live.status.label(),
                "verification status refreshed"
            );
        } else {
            debug!(business_id = %business_id, status = live.status.label(), "verification status unchanged");
        }

        Ok(StatusReport {
            status: live.status,
            details: live.details,
            changed,
        })
    }

    fn load(&self, business_id: &BusinessId) -> Result<Business, ProvisioningError> {
        self.store
            .fetch_business(business_id)?
            .ok_or_else(|| ProvisioningError::BusinessNotFound(business_id.clone()))
    }

    async fn ensure_account(
        &self,
        business: &mut Business,
        profile: &OnboardingProfile,
    ) -> Result<String, ProvisioningError> {
        if let Some(account_id) = &business.carrier_account_id {
            return Ok(account_id.clone());
        }
        let account_id = self.carrier.resolve_account(business, profile).await?;
        self.store.set_carrier_account(&business.id, &account_id)?;
        business.carrier_account_id = Some(account_id.clone());
        Ok(account_id)
    }
}
