mod common;

use std::sync::Arc;
use std::time::Duration;

use common::RecordingCarrier;
use tollfree::config::ProvisioningConfig;
use tollfree::provisioning::{ProvisionOutcome, ProvisioningError, ProvisioningService};
use tollfree::queue::QueueDrainWorker;
use tollfree::store::{BusinessId, BusinessStore, InMemoryStore, QueueItemStatus, QueueStore};

fn settings(max_numbers: usize) -> ProvisioningConfig {
    ProvisioningConfig {
        max_numbers,
        ..ProvisioningConfig::default()
    }
}

fn store_with(ids: &[&str]) -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::with_businesses(
        ids.iter().map(|id| common::business(id)),
    ))
}

#[tokio::test]
async fn sequential_requests_respect_a_single_slot() {
    let store = store_with(&["a", "b"]);
    let carrier = Arc::new(RecordingCarrier::default());
    let service = ProvisioningService::new(Arc::clone(&store), Arc::clone(&carrier), settings(1));

    let first = service
        .provision(&BusinessId::new("a"), &common::business_info())
        .await
        .expect("first");
    let second = service
        .provision(&BusinessId::new("b"), &common::business_info())
        .await
        .expect("second");

    assert!(matches!(first, ProvisionOutcome::Provisioned(_)));
    assert!(matches!(second, ProvisionOutcome::Queued { .. }));
    assert_eq!(carrier.purchases(), 1);
    assert_eq!(store.count_numbers_in_use().expect("count"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_never_exceed_capacity() {
    let ids = ["a", "b", "c", "d", "e", "f"];
    let store = store_with(&ids);
    let carrier = Arc::new(RecordingCarrier::with_purchase_delay(Duration::from_millis(25)));
    let service = Arc::new(ProvisioningService::new(
        Arc::clone(&store),
        Arc::clone(&carrier),
        settings(1),
    ));

    let mut handles = Vec::new();
    for id in ids {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .provision(&BusinessId::new(id), &common::business_info())
                .await
        }));
    }

    let mut provisioned = 0;
    let mut queued = 0;
    for handle in handles {
        match handle.await.expect("task").expect("provision") {
            ProvisionOutcome::Provisioned(_) => provisioned += 1,
            ProvisionOutcome::Queued { .. } => queued += 1,
        }
    }

    assert_eq!(provisioned, 1);
    assert_eq!(queued, 5);
    assert_eq!(carrier.purchases(), 1);
    assert_eq!(store.count_numbers_in_use().expect("count"), 1);
    assert_eq!(store.count_queued().expect("count"), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_requests_for_one_business_buy_one_number() {
    let store = store_with(&["a"]);
    let carrier = Arc::new(RecordingCarrier::with_purchase_delay(Duration::from_millis(50)));
    let service = Arc::new(ProvisioningService::new(
        Arc::clone(&store),
        Arc::clone(&carrier),
        settings(1),
    ));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .provision(&BusinessId::new("a"), &common::business_info())
                .await
        }));
    }

    let mut provisioned = 0;
    for handle in handles {
        match handle.await.expect("task") {
            Ok(ProvisionOutcome::Provisioned(_)) => provisioned += 1,
            Ok(ProvisionOutcome::Queued { .. }) => panic!("own claim must not queue"),
            Err(ProvisioningError::InProgress | ProvisioningError::AlreadyProvisioned { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(provisioned, 1);
    assert_eq!(carrier.purchases(), 1);
    assert_eq!(store.count_numbers_in_use().expect("count"), 1);
    let business = store
        .fetch_business(&BusinessId::new("a"))
        .expect("fetch")
        .expect("exists");
    assert_eq!(business.from_number.as_deref(), Some("+18885550001"));
}

#[tokio::test]
async fn drain_serves_queue_in_arrival_order() {
    let store = store_with(&["holder", "first", "second", "third"]);
    let carrier = Arc::new(RecordingCarrier::default());
    let service = ProvisioningService::new(Arc::clone(&store), Arc::clone(&carrier), settings(1));

    for id in ["holder", "first", "second", "third"] {
        service
            .provision(&BusinessId::new(id), &common::business_info())
            .await
            .expect("provision");
    }
    assert_eq!(store.count_queued().expect("count"), 3);

    let worker = QueueDrainWorker::new(Arc::clone(&store), Arc::clone(&carrier), settings(3));
    let report = worker.drain().await.expect("drain");

    assert_eq!(report.drained, 2);
    let items = store.queue_items();
    assert_eq!(items[0].business_id, BusinessId::new("first"));
    assert_eq!(items[0].status, QueueItemStatus::Done);
    assert_eq!(items[1].business_id, BusinessId::new("second"));
    assert_eq!(items[1].status, QueueItemStatus::Done);
    assert_eq!(items[2].business_id, BusinessId::new("third"));
    assert_eq!(items[2].status, QueueItemStatus::Queued);

    let second = worker.drain().await.expect("drain again");
    assert_eq!(second.drained, 0);
}

#[tokio::test]
async fn repeated_requests_while_queued_keep_one_queue_item() {
    let store = store_with(&["holder", "waiting"]);
    let carrier = Arc::new(RecordingCarrier::default());
    let service = ProvisioningService::new(Arc::clone(&store), Arc::clone(&carrier), settings(1));

    service
        .provision(&BusinessId::new("holder"), &common::business_info())
        .await
        .expect("holder");
    for _ in 0..3 {
        service
            .provision(&BusinessId::new("waiting"), &common::business_info())
            .await
            .expect("queued");
    }

    assert_eq!(store.count_queued().expect("count"), 1);
}
