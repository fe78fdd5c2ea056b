#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tollfree::carrier::{
    map_vendor_status, CampaignRequest, CapabilityStatus, CarrierError, CarrierGateway,
    OutboundSms, SentMessage, VerificationSubmission,
};
use tollfree::provisioning::{validate_business_info, BusinessInfo};
use tollfree::store::{Business, BusinessId, OnboardingProfile, PurchasedNumber, VerificationStatus};

pub fn business_info() -> BusinessInfo {
    serde_json::from_value(json!({
        "legal_name": "Harbor Dental PLLC",
        "dba_name": "Harbor Dental",
        "contact_email": "frontdesk@harbordental.example",
        "contact_phone": "+16175550111",
        "website": "https://harbordental.example",
        "opt_in_evidence_url": "https://harbordental.example/sms-consent",
        "privacy_policy_url": "https://harbordental.example/privacy",
        "estimated_monthly_volume": 800,
        "sole_prop": true,
        "address": {
            "line1": "200 Atlantic Ave",
            "city": "Boston",
            "state": "MA",
            "zip": "02110",
            "country": "US"
        }
    }))
    .expect("valid fixture")
}

pub fn onboarding_profile() -> OnboardingProfile {
    validate_business_info(&business_info()).expect("fixture validates")
}

pub fn business(id: &str) -> Business {
    Business::new(BusinessId::new(id), format!("Business {id}"))
}

/// Carrier double with an optional artificial purchase delay, used to widen race windows.
#[derive(Default)]
pub struct RecordingCarrier {
    purchases: AtomicUsize,
    purchase_delay: Option<Duration>,
    sent: Mutex<Vec<OutboundSms>>,
    fail_sends: bool,
}

impl RecordingCarrier {
    pub fn with_purchase_delay(delay: Duration) -> Self {
        Self {
            purchase_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing_sends() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }

    pub fn purchases(&self) -> usize {
        self.purchases.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<OutboundSms> {
        self.sent.lock().expect("sent mutex poisoned").clone()
    }
}

#[async_trait]
impl CarrierGateway for RecordingCarrier {
    async fn resolve_account(
        &self,
        business: &Business,
        _profile: &OnboardingProfile,
    ) -> Result<String, CarrierError> {
        Ok(format!("acct-{}", business.id))
    }

    async fn purchase_number(&self, _account_id: &str) -> Result<PurchasedNumber, CarrierError> {
        if let Some(delay) = self.purchase_delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.purchases.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PurchasedNumber {
            phone_id: format!("pn-{n}"),
            e164: format!("+1888555{n:04}"),
        })
    }

    async fn submit_verification(
        &self,
        _account_id: &str,
        _campaign: &CampaignRequest,
    ) -> Result<VerificationSubmission, CarrierError> {
        Ok(VerificationSubmission {
            verification_id: format!("cmp-{}", self.purchases()),
            status: VerificationStatus::Pending,
        })
    }

    async fn capability_status(&self, _account_id: &str) -> Result<CapabilityStatus, CarrierError> {
        Ok(CapabilityStatus {
            status: map_vendor_status("pending"),
            vendor_status: "pending".to_string(),
            details: None,
        })
    }

    async fn send_message(
        &self,
        _account_id: &str,
        message: &OutboundSms,
    ) -> Result<SentMessage, CarrierError> {
        if self.fail_sends {
            return Err(CarrierError::Transport("carrier unreachable".to_string()));
        }
        let mut sent = self.sent.lock().expect("sent mutex poisoned");
        sent.push(message.clone());
        Ok(SentMessage {
            message_id: format!("auto-{}", sent.len()),
            status: "queued".to_string(),
        })
    }
}
