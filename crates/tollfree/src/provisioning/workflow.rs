use serde::Serialize;
use tracing::{error, info, warn};

use super::ProvisioningError;
use crate::carrier::{CampaignRequest, CarrierGateway};
use crate::store::{
    Business, BusinessId, OnboardingProfile, SlotReservation, Store, StoreError,
    VerificationStatus,
};

/// Number and verification state after the purchase and submission steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedNumber {
    pub from_number: String,
    pub verification_id: String,
    pub status: VerificationStatus,
}

/// Exclusive provisioning claim on one business. Dropping it releases the slot, so a
/// failed or cancelled run frees capacity and lets a later attempt claim it again.
pub(crate) struct SlotClaim<'a, S: Store + ?Sized> {
    store: &'a S,
    business_id: BusinessId,
}

pub(crate) enum Claim<'a, S: Store + ?Sized> {
    Held(SlotClaim<'a, S>),
    InFlight,
    Exhausted { in_use: usize, max: usize },
}

impl<'a, S: Store + ?Sized> SlotClaim<'a, S> {
    /// `max` of 0 means unlimited capacity; the claim is still exclusive.
    pub(crate) fn acquire(
        store: &'a S,
        business_id: &BusinessId,
        max: usize,
    ) -> Result<Claim<'a, S>, StoreError> {
        Ok(match store.reserve_number_slot(business_id, max)? {
            SlotReservation::Reserved => Claim::Held(SlotClaim {
                store,
                business_id: business_id.clone(),
            }),
            SlotReservation::InFlight => Claim::InFlight,
            SlotReservation::Exhausted { in_use, max } => Claim::Exhausted { in_use, max },
        })
    }
}

impl<S: Store + ?Sized> Drop for SlotClaim<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.store.release_number_slot(&self.business_id) {
            warn!(business_id = %self.business_id, error = %err, "failed to release provisioning slot");
        }
    }
}

/// Buys a number (unless one is already persisted) and submits the compliance campaign.
///
/// `business` must be read after `claim` was acquired so a number bought by an
/// earlier run is seen.
pub(crate) async fn purchase_and_submit<S, C>(
    claim: &SlotClaim<'_, S>,
    carrier: &C,
    business: &Business,
    account_id: &str,
    profile: &OnboardingProfile,
) -> Result<ProvisionedNumber, ProvisioningError>
where
    S: Store + ?Sized,
    C: CarrierGateway + ?Sized,
{
    let store = claim.store;
    let from_number = match &business.from_number {
        Some(existing) => {
            info!(business_id = %business.id, number = %existing, "resuming at verification step");
            existing.clone()
        }
        None => {
            let purchased = carrier.purchase_number(account_id).await?;
            if let Err(err) = store.record_purchased_number(&business.id, &purchased) {
                error!(
                    business_id = %business.id,
                    phone_id = %purchased.phone_id,
                    number = %purchased.e164,
                    error = %err,
                    "purchased number could not be persisted"
                );
                return Err(err.into());
            }
            purchased.e164
        }
    };

    let campaign = CampaignRequest::from_profile(profile);
    let submission = carrier.submit_verification(account_id, &campaign).await?;
    store.record_verification_submission(&business.id, &submission.verification_id, profile)?;

    info!(
        business_id = %business.id,
        number = %from_number,
        verification_id = %submission.verification_id,
        "toll-free verification submitted"
    );

    Ok(ProvisionedNumber {
        from_number,
        verification_id: submission.verification_id,
        status: VerificationStatus::Pending,
    })
}
