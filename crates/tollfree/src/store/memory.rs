use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    Business, BusinessId, Contact, Message, MessageUpsert, OnboardingProfile,
    ProvisioningQueueItem, PurchasedNumber, QueueItemStatus, SlotReservation, VerificationStatus,
};
use super::{BusinessStore, ContactStore, MessageStore, QueueStore, StoreError};

#[derive(Debug, Default)]
struct State {
    businesses: BTreeMap<BusinessId, Business>,
    reservations: BTreeSet<BusinessId>,
    contacts: HashMap<(BusinessId, String), Contact>,
    messages: HashMap<String, Message>,
    queue: BTreeMap<u64, ProvisioningQueueItem>,
    next_queue_id: u64,
    queue_locked: bool,
}

impl State {
    fn business_mut(&mut self, id: &BusinessId) -> Result<&mut Business, StoreError> {
        self.businesses.get_mut(id).ok_or(StoreError::NotFound)
    }

    fn numbers_in_use(&self) -> usize {
        let assigned = self
            .businesses
            .values()
            .filter(|business| business.from_number.is_some())
            .count();
        let reserved = self
            .reservations
            .iter()
            .filter(|id| {
                self.businesses
                    .get(*id)
                    .map_or(true, |business| business.from_number.is_none())
            })
            .count();
        assigned + reserved
    }
}

/// Mutex-backed store. A single lock covers every table so capacity checks and
/// reservations are atomic.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_businesses(businesses: impl IntoIterator<Item = Business>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for business in businesses {
                state.businesses.insert(business.id.clone(), business);
            }
        }
        store
    }

    /// Every queue item regardless of status, oldest first.
    pub fn queue_items(&self) -> Vec<ProvisioningQueueItem> {
        self.lock().queue.values().cloned().collect()
    }

    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn contact_count(&self) -> usize {
        self.lock().contacts.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("store mutex poisoned")
    }
}

impl BusinessStore for InMemoryStore {
    fn insert_business(&self, business: Business) -> Result<Business, StoreError> {
        let mut state = self.lock();
        if state.businesses.contains_key(&business.id) {
            return Err(StoreError::Conflict);
        }
        state.businesses.insert(business.id.clone(), business.clone());
        Ok(business)
    }

    fn fetch_business(&self, id: &BusinessId) -> Result<Option<Business>, StoreError> {
        Ok(self.lock().businesses.get(id).cloned())
    }

    fn find_business_by_number(&self, e164: &str) -> Result<Option<Business>, StoreError> {
        Ok(self
            .lock()
            .businesses
            .values()
            .find(|business| business.from_number.as_deref() == Some(e164))
            .cloned())
    }

    fn set_carrier_account(&self, id: &BusinessId, account_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let business = state.business_mut(id)?;
        business.carrier_account_id = Some(account_id.to_string());
        business.updated_at = Utc::now();
        Ok(())
    }

    fn save_onboarding(
        &self,
        id: &BusinessId,
        profile: &OnboardingProfile,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let business = state.business_mut(id)?;
        business.onboarding = Some(profile.clone());
        business.updated_at = Utc::now();
        Ok(())
    }

    fn record_purchased_number(
        &self,
        id: &BusinessId,
        number: &PurchasedNumber,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let taken = state.businesses.values().any(|business| {
            business.id != *id && business.from_number.as_deref() == Some(number.e164.as_str())
        });
        if taken {
            return Err(StoreError::Conflict);
        }
        let business = state.business_mut(id)?;
        if business.from_number.is_some() {
            return Err(StoreError::Conflict);
        }
        business.carrier_phone_id = Some(number.phone_id.clone());
        business.from_number = Some(number.e164.clone());
        business.updated_at = Utc::now();
        Ok(())
    }

    fn record_verification_submission(
        &self,
        id: &BusinessId,
        verification_id: &str,
        profile: &OnboardingProfile,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let business = state.business_mut(id)?;
        business.verification_id = Some(verification_id.to_string());
        business.verification_status = VerificationStatus::Pending;
        business.last_verification_error = None;
        business.onboarding = Some(profile.clone());
        business.updated_at = Utc::now();
        Ok(())
    }

    fn update_verification_status(
        &self,
        id: &BusinessId,
        status: VerificationStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let business = state.business_mut(id)?;
        business.verification_status = status;
        business.last_verification_error = error.map(str::to_string);
        business.updated_at = Utc::now();
        Ok(())
    }

    fn update_verification_status_for_account(
        &self,
        account_id: &str,
        status: VerificationStatus,
        error: Option<&str>,
    ) -> Result<usize, StoreError> {
        let mut state = self.lock();
        let now = Utc::now();
        let mut updated = 0;
        for business in state
            .businesses
            .values_mut()
            .filter(|business| business.carrier_account_id.as_deref() == Some(account_id))
        {
            business.verification_status = status;
            business.last_verification_error = error.map(str::to_string);
            business.updated_at = now;
            updated += 1;
        }
        Ok(updated)
    }

    fn businesses_with_status(
        &self,
        status: VerificationStatus,
        limit: usize,
    ) -> Result<Vec<Business>, StoreError> {
        Ok(self
            .lock()
            .businesses
            .values()
            .filter(|business| business.verification_status == status)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count_numbers_in_use(&self) -> Result<usize, StoreError> {
        Ok(self.lock().numbers_in_use())
    }

    fn reserve_number_slot(
        &self,
        id: &BusinessId,
        max: usize,
    ) -> Result<SlotReservation, StoreError> {
        let mut state = self.lock();
        let business = state.businesses.get(id).ok_or(StoreError::NotFound)?;
        if state.reservations.contains(id) {
            return Ok(SlotReservation::InFlight);
        }
        let in_use = state.numbers_in_use();
        if business.from_number.is_none() && max > 0 && in_use >= max {
            return Ok(SlotReservation::Exhausted { in_use, max });
        }
        state.reservations.insert(id.clone());
        Ok(SlotReservation::Reserved)
    }

    fn release_number_slot(&self, id: &BusinessId) -> Result<(), StoreError> {
        self.lock().reservations.remove(id);
        Ok(())
    }
}

impl ContactStore for InMemoryStore {
    fn upsert_contact(&self, business_id: &BusinessId, phone: &str) -> Result<Contact, StoreError> {
        let mut state = self.lock();
        let now = Utc::now();
        let contact = state
            .contacts
            .entry((business_id.clone(), phone.to_string()))
            .and_modify(|contact| contact.updated_at = now)
            .or_insert_with(|| Contact {
                business_id: business_id.clone(),
                phone_e164: phone.to_string(),
                opted_out: false,
                opted_out_at: None,
                created_at: now,
                updated_at: now,
            });
        Ok(contact.clone())
    }

    fn set_contact_opt_out(
        &self,
        business_id: &BusinessId,
        phone: &str,
        opted_out: bool,
    ) -> Result<Contact, StoreError> {
        let mut state = self.lock();
        let contact = state
            .contacts
            .get_mut(&(business_id.clone(), phone.to_string()))
            .ok_or(StoreError::NotFound)?;
        let now = Utc::now();
        if contact.opted_out != opted_out {
            contact.opted_out_at = opted_out.then_some(now);
        }
        contact.opted_out = opted_out;
        contact.updated_at = now;
        Ok(contact.clone())
    }

    fn fetch_contact(
        &self,
        business_id: &BusinessId,
        phone: &str,
    ) -> Result<Option<Contact>, StoreError> {
        Ok(self
            .lock()
            .contacts
            .get(&(business_id.clone(), phone.to_string()))
            .cloned())
    }
}

impl MessageStore for InMemoryStore {
    fn upsert_message(&self, message: MessageUpsert) -> Result<Message, StoreError> {
        let mut state = self.lock();
        let now = Utc::now();
        let stored = state
            .messages
            .entry(message.carrier_message_id.clone())
            .or_insert_with(|| Message {
                carrier_message_id: message.carrier_message_id.clone(),
                business_id: None,
                direction: None,
                channel: "sms".to_string(),
                from: None,
                to: None,
                body: None,
                status: None,
                error: None,
                created_at: now,
                updated_at: now,
            });
        stored.business_id = Some(message.business_id);
        stored.direction = Some(message.direction);
        stored.from = Some(message.from);
        stored.to = Some(message.to);
        stored.body = Some(message.body);
        // A delivery receipt that raced ahead of the send keeps its status.
        if stored.status.is_none() {
            stored.status = Some(message.status);
        }
        stored.updated_at = now;
        Ok(stored.clone())
    }

    fn upsert_message_status(
        &self,
        carrier_message_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<Message, StoreError> {
        let mut state = self.lock();
        let now = Utc::now();
        let stored = state
            .messages
            .entry(carrier_message_id.to_string())
            .or_insert_with(|| Message {
                carrier_message_id: carrier_message_id.to_string(),
                business_id: None,
                direction: None,
                channel: "sms".to_string(),
                from: None,
                to: None,
                body: None,
                status: None,
                error: None,
                created_at: now,
                updated_at: now,
            });
        stored.status = Some(status.to_string());
        stored.error = error.map(str::to_string);
        stored.updated_at = now;
        Ok(stored.clone())
    }

    fn fetch_message(&self, carrier_message_id: &str) -> Result<Option<Message>, StoreError> {
        Ok(self.lock().messages.get(carrier_message_id).cloned())
    }

    fn messages_for_business(&self, business_id: &BusinessId) -> Result<Vec<Message>, StoreError> {
        let state = self.lock();
        let mut messages: Vec<Message> = state
            .messages
            .values()
            .filter(|message| message.business_id.as_ref() == Some(business_id))
            .cloned()
            .collect();
        messages.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.carrier_message_id.cmp(&b.carrier_message_id))
        });
        Ok(messages)
    }
}

impl QueueStore for InMemoryStore {
    fn enqueue_provisioning(
        &self,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<ProvisioningQueueItem, StoreError> {
        let mut state = self.lock();
        if let Some(open) = state
            .queue
            .values()
            .find(|item| item.business_id == *business_id && item.status.is_open())
        {
            return Ok(open.clone());
        }

        state.next_queue_id += 1;
        let item = ProvisioningQueueItem {
            id: state.next_queue_id,
            business_id: business_id.clone(),
            status: QueueItemStatus::Queued,
            error: None,
            created_at: now,
            updated_at: now,
        };
        state.queue.insert(item.id, item.clone());
        Ok(item)
    }

    fn queued_items(&self, limit: usize) -> Result<Vec<ProvisioningQueueItem>, StoreError> {
        let state = self.lock();
        let mut items: Vec<ProvisioningQueueItem> = state
            .queue
            .values()
            .filter(|item| item.status == QueueItemStatus::Queued)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        items.truncate(limit);
        Ok(items)
    }

    fn count_queued(&self) -> Result<usize, StoreError> {
        Ok(self
            .lock()
            .queue
            .values()
            .filter(|item| item.status == QueueItemStatus::Queued)
            .count())
    }

    fn fetch_queue_item(&self, id: u64) -> Result<Option<ProvisioningQueueItem>, StoreError> {
        Ok(self.lock().queue.get(&id).cloned())
    }

    fn update_queue_item(
        &self,
        id: u64,
        status: QueueItemStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let item = state.queue.get_mut(&id).ok_or(StoreError::NotFound)?;
        item.status = status;
        item.error = error.map(str::to_string);
        item.updated_at = Utc::now();
        Ok(())
    }

    fn try_lock_queue(&self) -> Result<bool, StoreError> {
        let mut state = self.lock();
        if state.queue_locked {
            return Ok(false);
        }
        state.queue_locked = true;
        Ok(true)
    }

    fn unlock_queue(&self) -> Result<(), StoreError> {
        self.lock().queue_locked = false;
        Ok(())
    }
}
