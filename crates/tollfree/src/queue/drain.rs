use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{DrainError, DrainReport};
use crate::carrier::CarrierGateway;
use crate::config::ProvisioningConfig;
use crate::provisioning::workflow::{purchase_and_submit, Claim, SlotClaim};
use crate::provisioning::ProvisioningError;
use crate::store::{ProvisioningQueueItem, QueueItemStatus, Store, StoreError};

enum ItemResult {
    Done,
    Failed(String),
    /// Capacity was taken by a concurrent provision; the item goes back in line.
    Deferred,
    /// A direct provision request for the same business is running.
    Busy,
}

/// Holds the advisory queue lock until dropped.
struct QueueLease<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> QueueLease<'a, S> {
    fn acquire(store: &'a S) -> Result<Option<Self>, DrainError> {
        Ok(store.try_lock_queue()?.then_some(Self { store }))
    }
}

impl<S: Store + ?Sized> Drop for QueueLease<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.store.unlock_queue() {
            error!(error = %err, "failed to release queue lock");
        }
    }
}

/// A queue item marked `processing`. Unless settled, dropping it puts the item back
/// to `queued` so an aborted run does not strand it.
struct InFlightItem<'a, S: Store + ?Sized> {
    store: &'a S,
    id: u64,
    settled: bool,
}

impl<'a, S: Store + ?Sized> InFlightItem<'a, S> {
    fn start(store: &'a S, id: u64) -> Result<Self, DrainError> {
        store.update_queue_item(id, QueueItemStatus::Processing, None)?;
        Ok(Self {
            store,
            id,
            settled: false,
        })
    }

    fn settle(mut self, status: QueueItemStatus, error: Option<&str>) -> Result<(), DrainError> {
        self.store.update_queue_item(self.id, status, error)?;
        self.settled = true;
        Ok(())
    }
}

impl<S: Store + ?Sized> Drop for InFlightItem<'_, S> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(queue_item_id = self.id, "drain aborted mid-item, returning it to the queue");
        if let Err(err) = self
            .store
            .update_queue_item(self.id, QueueItemStatus::Queued, None)
        {
            error!(queue_item_id = self.id, error = %err, "failed to requeue item");
        }
    }
}

/// Processes queued provisioning requests oldest first, up to the free capacity.
pub struct QueueDrainWorker<S, C> {
    store: Arc<S>,
    carrier: Arc<C>,
    settings: ProvisioningConfig,
}

impl<S, C> QueueDrainWorker<S, C>
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

    /// The lock and the in-flight item are restored even when the returned future is
    /// dropped before completion.
    pub async fn drain(&self) -> Result<DrainReport, DrainError> {
        let Some(_lease) = QueueLease::acquire(self.store.as_ref())? else {
            return Err(DrainError::AlreadyRunning);
        };
        self.drain_locked().await
    }

    async fn drain_locked(&self) -> Result<DrainReport, DrainError> {
        let remaining = self.remaining_capacity()?;
        if remaining == 0 {
            debug!("no free number capacity, drain skipped");
            return Ok(DrainReport::default());
        }

        let items = self.store.queued_items(remaining)?;
        let mut report = DrainReport::default();
        for item in items {
            let in_flight = InFlightItem::start(self.store.as_ref(), item.id)?;

            match self.process(&item).await? {
                ItemResult::Done => {
                    in_flight.settle(QueueItemStatus::Done, None)?;
                    report.attempted += 1;
                    report.drained += 1;
                }
                ItemResult::Failed(message) => {
                    warn!(
                        queue_item_id = item.id,
                        business_id = %item.business_id,
                        error = %message,
                        "queued provisioning failed"
                    );
                    in_flight.settle(QueueItemStatus::Error, Some(&message))?;
                    report.attempted += 1;
                    report.failed += 1;
                }
                ItemResult::Busy => {
                    in_flight.settle(QueueItemStatus::Queued, None)?;
                    debug!(queue_item_id = item.id, "business is being provisioned elsewhere, skipped");
                }
                ItemResult::Deferred => {
                    in_flight.settle(QueueItemStatus::Queued, None)?;
                    info!(queue_item_id = item.id, "capacity taken concurrently, drain stopped");
                    break;
                }
            }
        }

        info!(
            drained = report.drained,
            attempted = report.attempted,
            failed = report.failed,
            "provisioning queue drained"
        );
        Ok(report)
    }

    /// Free slots under a cap, or the drain batch size when capacity is unlimited.
    fn remaining_capacity(&self) -> Result<usize, DrainError> {
        if self.settings.unlimited() {
            return Ok(self.settings.drain_batch_size.max(1));
        }
        let in_use = self.store.count_numbers_in_use()?;
        Ok(self.settings.max_numbers.saturating_sub(in_use))
    }

    /// Store failures abort the run; everything else is recorded on the item.
    async fn process(&self, item: &ProvisioningQueueItem) -> Result<ItemResult, DrainError> {
        let claim = match SlotClaim::acquire(
            self.store.as_ref(),
            &item.business_id,
            self.settings.max_numbers,
        ) {
            Ok(Claim::Held(claim)) => claim,
            Ok(Claim::InFlight) => return Ok(ItemResult::Busy),
            Ok(Claim::Exhausted { .. }) => return Ok(ItemResult::Deferred),
            Err(StoreError::NotFound) => {
                return Ok(ItemResult::Failed("business no longer exists".to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let Some(mut business) = self.store.fetch_business(&item.business_id)? else {
            return Ok(ItemResult::Failed("business no longer exists".to_string()));
        };
        if business.is_fully_provisioned() {
            return Ok(ItemResult::Done);
        }
        let Some(profile) = business.onboarding.clone() else {
            return Ok(ItemResult::Failed(
                ProvisioningError::MissingOnboarding.to_string(),
            ));
        };

        let account_id = match &business.carrier_account_id {
            Some(account_id) => account_id.clone(),
            None => match self.carrier.resolve_account(&business, &profile).await {
                Ok(account_id) => {
                    self.store.set_carrier_account(&business.id, &account_id)?;
                    business.carrier_account_id = Some(account_id.clone());
                    account_id
                }
                Err(err) => return Ok(ItemResult::Failed(err.to_string())),
            },
        };

        match purchase_and_submit(
            &claim,
            self.carrier.as_ref(),
            &business,
            &account_id,
            &profile,
        )
        .await
        {
            Ok(_) => Ok(ItemResult::Done),
            Err(err) => Ok(ItemResult::Failed(err.to_string())),
        }
    }
}
