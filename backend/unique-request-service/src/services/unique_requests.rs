use tracing::debug;

use crate::models::RequestId;
use crate::services::counter::UniqueCounter;
use crate::services::event_bridge::EventBridge;
use crate::services::membership::{MembershipStore, Origin};

/// Dedup-and-count engine shared by ingress, the aggregator and the merge loop
///
/// Constructed once at startup and handed out behind an `Arc`; tests build a
/// fresh instance each.
pub struct UniqueRequestService {
    membership: MembershipStore,
    counter: UniqueCounter,
    bridge: EventBridge,
}

/// Result of recording an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    pub was_new: bool,
    /// Counter value read after the (possible) increment
    pub unique_count: u64,
}

impl UniqueRequestService {
    pub fn new(bridge: EventBridge) -> Self {
        Self {
            membership: MembershipStore::new(),
            counter: UniqueCounter::new(),
            bridge,
        }
    }

    /// Record an identifier accepted by ingress.
    ///
    /// Publishes unconditionally, then increments the counter only on the
    /// identifier's first observation.
    pub fn record(&self, id: RequestId) -> Recorded {
        self.bridge.publish_identifier(id);

        let was_new = self.membership.observe(id, Origin::Local);
        if was_new {
            self.counter.increment();
            debug!(request_id = %id, "New unique request");
        }

        Recorded {
            was_new,
            unique_count: self.counter.current(),
        }
    }

    pub fn unique_count(&self) -> u64 {
        self.counter.current()
    }

    pub fn membership(&self) -> &MembershipStore {
        &self.membership
    }

    pub fn counter(&self) -> &UniqueCounter {
        &self.counter
    }

    pub fn bridge(&self) -> &EventBridge {
        &self.bridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::event_bridge::{MockEventPublisher, OutboundRecord};
    use std::sync::{Arc, Mutex};

    fn service_with_recorder() -> (UniqueRequestService, Arc<Mutex<Vec<OutboundRecord>>>) {
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&published);

        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().returning(move |record| {
            sink.lock().unwrap().push(record.clone());
            Ok(())
        });

        let bridge = EventBridge::new(Arc::new(publisher), "unique-requests", "unique-requests");
        (UniqueRequestService::new(bridge), published)
    }

    #[test]
    fn test_first_observation_increments() {
        let (service, _) = service_with_recorder();

        let recorded = service.record(RequestId(42));
        assert!(recorded.was_new);
        assert_eq!(recorded.unique_count, 1);
        assert_eq!(service.unique_count(), 1);
    }

    #[test]
    fn test_duplicate_does_not_increment_but_still_publishes() {
        let (service, published) = service_with_recorder();

        service.record(RequestId(42));
        let recorded = service.record(RequestId(42));

        assert!(!recorded.was_new);
        assert_eq!(service.unique_count(), 1);
        assert_eq!(published.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_remote_identifier_is_not_counted_locally() {
        let (service, _) = service_with_recorder();

        service.membership().observe(RequestId(9), Origin::Remote);
        let recorded = service.record(RequestId(9));

        assert!(!recorded.was_new);
        assert_eq!(service.unique_count(), 0);
    }

    #[test]
    fn test_concurrent_records_count_each_identifier_once() {
        let (service, _) = service_with_recorder();
        let service = Arc::new(service);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        service.record(RequestId(i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(service.unique_count(), 250);
        assert_eq!(service.membership().len(), 250);
    }
}
