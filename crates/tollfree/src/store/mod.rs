//! Abstract record store for businesses, contacts, messages, and the provisioning queue.
//!
//! The real database lives outside this crate; workflows only see these traits.
//! [`InMemoryStore`] backs the service binary and the test suites.

pub mod domain;
pub mod memory;

use chrono::{DateTime, Utc};

pub use domain::{
    Business, BusinessId, BusinessIdentity, Contact, Message, MessageDirection, MessageUpsert,
    OnboardingProfile, PostalAddress, ProvisioningQueueItem, PurchasedNumber, QueueItemStatus,
    SlotReservation, VerificationStatus,
};
pub use memory::InMemoryStore;

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub trait BusinessStore: Send + Sync {
    fn insert_business(&self, business: Business) -> Result<Business, StoreError>;
    fn fetch_business(&self, id: &BusinessId) -> Result<Option<Business>, StoreError>;
    fn find_business_by_number(&self, e164: &str) -> Result<Option<Business>, StoreError>;
    fn set_carrier_account(&self, id: &BusinessId, account_id: &str) -> Result<(), StoreError>;
    fn save_onboarding(
        &self,
        id: &BusinessId,
        profile: &OnboardingProfile,
    ) -> Result<(), StoreError>;
    /// Persists the number; `Conflict` when the business already owns one or the
    /// number belongs to another business.
    fn record_purchased_number(
        &self,
        id: &BusinessId,
        number: &PurchasedNumber,
    ) -> Result<(), StoreError>;
    /// Stores the verification id and moves the business to `pending`.
    fn record_verification_submission(
        &self,
        id: &BusinessId,
        verification_id: &str,
        profile: &OnboardingProfile,
    ) -> Result<(), StoreError>;
    fn update_verification_status(
        &self,
        id: &BusinessId,
        status: VerificationStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;
    /// Applies the status to every business on the account, returning how many matched.
    fn update_verification_status_for_account(
        &self,
        account_id: &str,
        status: VerificationStatus,
        error: Option<&str>,
    ) -> Result<usize, StoreError>;
    fn businesses_with_status(
        &self,
        status: VerificationStatus,
        limit: usize,
    ) -> Result<Vec<Business>, StoreError>;
    /// Businesses holding a number plus outstanding reservations.
    fn count_numbers_in_use(&self) -> Result<usize, StoreError>;
    /// Atomically claims the provisioning slot for `id`, checking the in-use count
    /// against `max` (0 = unlimited) unless the business already holds a number.
    fn reserve_number_slot(
        &self,
        id: &BusinessId,
        max: usize,
    ) -> Result<SlotReservation, StoreError>;
    fn release_number_slot(&self, id: &BusinessId) -> Result<(), StoreError>;
}

pub trait ContactStore: Send + Sync {
    fn upsert_contact(&self, business_id: &BusinessId, phone: &str) -> Result<Contact, StoreError>;
    fn set_contact_opt_out(
        &self,
        business_id: &BusinessId,
        phone: &str,
        opted_out: bool,
    ) -> Result<Contact, StoreError>;
    fn fetch_contact(
        &self,
        business_id: &BusinessId,
        phone: &str,
    ) -> Result<Option<Contact>, StoreError>;
}

pub trait MessageStore: Send + Sync {
    fn upsert_message(&self, message: MessageUpsert) -> Result<Message, StoreError>;
    /// Overwrites status and error, creating a bare row when the id is unknown.
    fn upsert_message_status(
        &self,
        carrier_message_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<Message, StoreError>;
    fn fetch_message(&self, carrier_message_id: &str) -> Result<Option<Message>, StoreError>;
    fn messages_for_business(&self, business_id: &BusinessId) -> Result<Vec<Message>, StoreError>;
}

pub trait QueueStore: Send + Sync {
    /// Returns the open item for the business when one already exists.
    fn enqueue_provisioning(
        &self,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<ProvisioningQueueItem, StoreError>;
    /// Oldest queued items first.
    fn queued_items(&self, limit: usize) -> Result<Vec<ProvisioningQueueItem>, StoreError>;
    fn count_queued(&self) -> Result<usize, StoreError>;
    fn fetch_queue_item(&self, id: u64) -> Result<Option<ProvisioningQueueItem>, StoreError>;
    fn update_queue_item(
        &self,
        id: u64,
        status: QueueItemStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;
    /// Advisory lock guarding a drain run; false when another holder exists.
    fn try_lock_queue(&self) -> Result<bool, StoreError>;
    fn unlock_queue(&self) -> Result<(), StoreError>;
}

/// Combined store used by the workflows.
pub trait Store: BusinessStore + ContactStore + MessageStore + QueueStore {}

impl<T> Store for T where T: BusinessStore + ContactStore + MessageStore + QueueStore {}
