mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use common::{eventually, service_on, TOPIC};
use unique_request_service::models::{ReportEvent, RequestId};
use unique_request_service::services::event_bridge::{InMemoryBus, OutboundRecord};
use unique_request_service::services::{EventPublisher, MembershipMerger, Origin, RecordSource};

const POLL: Duration = Duration::from_millis(20);

fn merger_for(
    bus: &InMemoryBus,
    service: &unique_request_service::services::UniqueRequestService,
) -> MembershipMerger {
    let source: Arc<dyn RecordSource> = Arc::new(bus.subscribe(TOPIC, POLL));
    MembershipMerger::new(source, service.membership().clone(), POLL)
}

#[tokio::test]
async fn test_identifiers_seen_by_one_instance_reach_the_other() {
    let bus = InMemoryBus::new(1024);
    let a = service_on(Arc::new(bus.clone()));
    let b = service_on(Arc::new(bus.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let merge_a = merger_for(&bus, &a).spawn(shutdown_rx.clone());
    let merge_b = merger_for(&bus, &b).spawn(shutdown_rx);

    for id in [10, 20, 30] {
        assert!(a.record(RequestId(id)).was_new);
    }

    let converged = eventually(Duration::from_secs(5), || {
        [10, 20, 30]
            .iter()
            .all(|id| b.membership().contains(RequestId(*id)))
    })
    .await;
    assert!(converged);

    // Merged identifiers are never counted on the receiving side.
    assert_eq!(b.unique_count(), 0);
    assert_eq!(b.membership().origin_of(RequestId(10)), Some(Origin::Remote));

    // Consuming its own identifiers leaves the originating instance unchanged.
    assert_eq!(a.unique_count(), 3);
    assert_eq!(a.membership().origin_of(RequestId(20)), Some(Origin::Local));

    // The other instance now treats the identifier as a duplicate.
    let recorded = b.record(RequestId(20));
    assert!(!recorded.was_new);
    assert_eq!(recorded.unique_count, 0);

    shutdown_tx.send(true).unwrap();
    merge_a.await.unwrap();
    merge_b.await.unwrap();
}

#[tokio::test]
async fn test_report_records_on_the_shared_topic_are_not_merged() {
    let bus = InMemoryBus::new(1024);
    let a = service_on(Arc::new(bus.clone()));
    let b = service_on(Arc::new(bus.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let merge_b = merger_for(&bus, &b).spawn(shutdown_rx);

    a.bridge().publish_report(&ReportEvent::new(5)).unwrap();
    a.record(RequestId(99));

    let merged = eventually(Duration::from_secs(5), || {
        b.membership().contains(RequestId(99))
    })
    .await;
    assert!(merged);
    assert_eq!(b.membership().len(), 1);
    assert!(!b.membership().contains(RequestId(5)));

    shutdown_tx.send(true).unwrap();
    merge_b.await.unwrap();
}

#[tokio::test]
async fn test_merge_loop_stops_on_shutdown() {
    let bus = InMemoryBus::new(16);
    let service = service_on(Arc::new(bus.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = merger_for(&bus, &service).spawn(shutdown_rx);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("merge loop did not stop")
        .unwrap();
}

fn deliver(bus: &InMemoryBus, ids: &[i64]) {
    for id in ids {
        bus.publish(&OutboundRecord {
            topic: TOPIC.to_string(),
            key: Some(id.to_string()),
            payload: id.to_string(),
        })
        .unwrap();
    }
}

#[tokio::test]
async fn test_stores_converge_regardless_of_delivery_order() {
    let bus_x = InMemoryBus::new(64);
    let bus_y = InMemoryBus::new(64);
    let x = service_on(Arc::new(bus_x.clone()));
    let y = service_on(Arc::new(bus_y.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let merge_x = merger_for(&bus_x, &x).spawn(shutdown_rx.clone());
    let merge_y = merger_for(&bus_y, &y).spawn(shutdown_rx);

    // Same identifiers, different order, duplicates and a local ingest on one side.
    deliver(&bus_x, &[1, 2, 3, 4, 5]);
    y.record(RequestId(4));
    deliver(&bus_y, &[5, 3, 1, 3, 2]);

    let ids = [1, 2, 3, 4, 5];
    let converged = eventually(Duration::from_secs(5), || {
        ids.iter().all(|id| {
            x.membership().contains(RequestId(*id)) && y.membership().contains(RequestId(*id))
        })
    })
    .await;
    assert!(converged);

    assert_eq!(x.membership().len(), ids.len());
    assert_eq!(y.membership().len(), ids.len());
    assert_eq!(x.unique_count(), 0);
    assert_eq!(y.unique_count(), 1);

    shutdown_tx.send(true).unwrap();
    merge_x.await.unwrap();
    merge_y.await.unwrap();
}
