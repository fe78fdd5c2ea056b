//! Fixtures shared by the unit test modules.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::carrier::{
    map_vendor_status, CampaignRequest, CapabilityStatus, CarrierError, CarrierGateway,
    OutboundSms, SentMessage, VerificationSubmission,
};
use crate::provisioning::BusinessInfo;
use crate::store::{Business, OnboardingProfile, PurchasedNumber, VerificationStatus};

pub(crate) fn business_info() -> BusinessInfo {
    serde_json::from_value(json!({
        "legal_name": "Acme Bakery LLC",
        "dba_name": "Acme Bakery",
        "contact_email": "owner@acme.example",
        "contact_phone": "+14155550123",
        "website": "https://acme.example",
        "opt_in_evidence_url": "https://acme.example/opt-in.png",
        "estimated_monthly_volume": 1500,
        "ein": "12-3456789",
        "address": {
            "street1": "1 Main St",
            "city": "Springfield",
            "state": "IL",
            "postal_code": "62701",
            "country": "US"
        }
    }))
    .expect("valid fixture")
}

#[derive(Default)]
struct FakeState {
    purchases: usize,
    messages_sent: Vec<(String, OutboundSms)>,
    campaigns: Vec<(String, CampaignRequest)>,
    capability: Option<(String, Option<String>)>,
    purchase_failure: Option<CarrierError>,
    purchase_delay: Option<Duration>,
    submission_failure: Option<CarrierError>,
    send_failure: Option<CarrierError>,
}

/// In-process carrier that hands out sequential numbers.
#[derive(Default)]
pub(crate) struct FakeCarrier {
    state: Mutex<FakeState>,
}

impl FakeCarrier {
    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake carrier mutex poisoned")
    }

    pub(crate) fn purchase_count(&self) -> usize {
        self.lock().purchases
    }

    pub(crate) fn submitted_campaigns(&self) -> Vec<(String, CampaignRequest)> {
        self.lock().campaigns.clone()
    }

    pub(crate) fn sent_messages(&self) -> Vec<(String, OutboundSms)> {
        self.lock().messages_sent.clone()
    }

    pub(crate) fn set_capability(&self, vendor_status: &str, details: Option<&str>) {
        self.lock().capability = Some((vendor_status.to_string(), details.map(str::to_string)));
    }

    pub(crate) fn fail_purchases(&self, error: CarrierError) {
        self.lock().purchase_failure = Some(error);
    }

    /// Holds every purchase open for `delay` before it completes.
    pub(crate) fn delay_purchases(&self, delay: Option<Duration>) {
        self.lock().purchase_delay = delay;
    }

    pub(crate) fn fail_submissions(&self, error: CarrierError) {
        self.lock().submission_failure = Some(error);
    }

    pub(crate) fn fail_sends(&self, error: CarrierError) {
        self.lock().send_failure = Some(error);
    }

    pub(crate) fn clear_failures(&self) {
        let mut state = self.lock();
        state.purchase_failure = None;
        state.submission_failure = None;
        state.send_failure = None;
    }
}

#[async_trait]
impl CarrierGateway for FakeCarrier {
    async fn resolve_account(
        &self,
        business: &Business,
        _profile: &OnboardingProfile,
    ) -> Result<String, CarrierError> {
        Ok(format!("acct-{}", business.id))
    }

    async fn purchase_number(&self, _account_id: &str) -> Result<PurchasedNumber, CarrierError> {
        let delay = self.lock().purchase_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        if let Some(error) = state.purchase_failure.clone() {
            return Err(error);
        }
        state.purchases += 1;
        Ok(PurchasedNumber {
            phone_id: format!("pn-{}", state.purchases),
            e164: format!("+1833555{:04}", state.purchases),
        })
    }

    async fn submit_verification(
        &self,
        account_id: &str,
        campaign: &CampaignRequest,
    ) -> Result<VerificationSubmission, CarrierError> {
        let mut state = self.lock();
        if let Some(error) = state.submission_failure.clone() {
            return Err(error);
        }
        state.campaigns.push((account_id.to_string(), campaign.clone()));
        Ok(VerificationSubmission {
            verification_id: format!("cmp-{}", state.campaigns.len()),
            status: VerificationStatus::Pending,
        })
    }

    async fn capability_status(&self, _account_id: &str) -> Result<CapabilityStatus, CarrierError> {
        let (vendor_status, details) = self
            .lock()
            .capability
            .clone()
            .unwrap_or_else(|| ("pending".to_string(), None));
        Ok(CapabilityStatus {
            status: map_vendor_status(&vendor_status),
            vendor_status,
            details,
        })
    }

    async fn send_message(
        &self,
        account_id: &str,
        message: &OutboundSms,
    ) -> Result<SentMessage, CarrierError> {
        let mut state = self.lock();
        if let Some(error) = state.send_failure.clone() {
            return Err(error);
        }
        state
            .messages_sent
            .push((account_id.to_string(), message.clone()));
        Ok(SentMessage {
            message_id: format!("msg-out-{}", state.messages_sent.len()),
            status: "queued".to_string(),
        })
    }
}
