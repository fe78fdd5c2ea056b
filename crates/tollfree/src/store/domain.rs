use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for businesses created at signup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessId(pub String);

impl BusinessId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BusinessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local toll-free verification lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    None,
    Pending,
    Active,
    ActionNeeded,
    Disabled,
}

impl VerificationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VerificationStatus::None => "none",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Active => "active",
            VerificationStatus::ActionNeeded => "action_needed",
            VerificationStatus::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Postal address captured during onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub street1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// How the business identifies itself to the carrier's verification desk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusinessIdentity {
    /// Nine digit employer identification number.
    Ein { value: String },
    SoleProprietor,
}

/// Validated onboarding fields persisted with the business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProfile {
    pub legal_name: String,
    pub dba_name: Option<String>,
    pub website: Option<String>,
    pub contact_first_name: Option<String>,
    pub contact_last_name: Option<String>,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub address: PostalAddress,
    pub identity: BusinessIdentity,
    pub estimated_monthly_volume: u32,
    pub opt_in_evidence_url: String,
    pub privacy_policy_url: Option<String>,
    pub terms_url: Option<String>,
    pub use_case_categories: Vec<String>,
    pub use_case_description: Option<String>,
}

impl OnboardingProfile {
    /// Name shown to message recipients.
    pub fn display_name(&self) -> &str {
        self.dba_name.as_deref().unwrap_or(&self.legal_name)
    }
}

/// Business record owned by the dashboard; this engine only mutates carrier fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Business {
    pub id: BusinessId,
    pub name: String,
    pub from_number: Option<String>,
    pub carrier_account_id: Option<String>,
    pub carrier_phone_id: Option<String>,
    pub verification_status: VerificationStatus,
    pub last_verification_error: Option<String>,
    pub verification_id: Option<String>,
    pub onboarding: Option<OnboardingProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    pub fn new(id: BusinessId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            from_number: None,
            carrier_account_id: None,
            carrier_phone_id: None,
            verification_status: VerificationStatus::None,
            last_verification_error: None,
            verification_id: None,
            onboarding: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn display_name(&self) -> &str {
        self.onboarding
            .as_ref()
            .map(OnboardingProfile::display_name)
            .unwrap_or(&self.name)
    }

    /// Number purchased and compliance campaign submitted.
    pub fn is_fully_provisioned(&self) -> bool {
        self.from_number.is_some() && self.verification_id.is_some()
    }
}

/// Number returned by the carrier after a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedNumber {
    pub phone_id: String,
    pub e164: String,
}

/// Recipient of a business, unique per (business, phone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub business_id: BusinessId,
    pub phone_e164: String,
    pub opted_out: bool,
    pub opted_out_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Stored SMS keyed by the carrier's message id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub carrier_message_id: String,
    pub business_id: Option<BusinessId>,
    pub direction: Option<MessageDirection>,
    pub channel: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub body: Option<String>,
    pub status: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written when a message body is known (inbound receipt or outbound send).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageUpsert {
    pub carrier_message_id: String,
    pub business_id: BusinessId,
    pub direction: MessageDirection,
    pub from: String,
    pub to: String,
    pub body: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl QueueItemStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, QueueItemStatus::Queued | QueueItemStatus::Processing)
    }
}

/// Deferred provisioning request created when capacity is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningQueueItem {
    pub id: u64,
    pub business_id: BusinessId,
    pub status: QueueItemStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an attempt to claim a business's provisioning slot.
///
/// A claim is exclusive per business. Businesses that already hold a number are
/// claimed without touching global capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotReservation {
    Reserved,
    /// Another provisioning run holds the claim for this business.
    InFlight,
    Exhausted { in_use: usize, max: usize },
}
