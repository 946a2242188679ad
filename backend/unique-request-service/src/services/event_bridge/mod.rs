//! Event bridge between the membership store and the shared event log
//!
//! The bridge has two independent duties:
//!
//! - **Publish**: every accepted identifier (new or not) and every report is
//!   enqueued on the event log. Publishing never waits for broker
//!   acknowledgement; failures are logged and dropped.
//! - **Merge**: a background loop consumes the same topic, including records
//!   published by other instances, and folds every identifier it finds into
//!   the local membership store. This is what makes all instances converge on
//!   the same dedup view. The merge path never touches the unique counter.
//!
//! ```text
//! ingress ──publish──▶ [ topic ] ──poll──▶ MembershipMerger ──observe(Remote)──▶ MembershipStore
//! aggregator ─publish─▶
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::metrics;
use crate::models::{ReportEvent, RequestId};
use crate::services::membership::{MembershipStore, Origin};

pub mod kafka;
pub mod memory;

pub use kafka::{KafkaEventPublisher, KafkaRecordSource};
pub use memory::{InMemoryBus, InMemoryRecordSource};

/// Record to be written to the event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Option<String>,
    pub payload: String,
}

/// Outbound side of the event log
#[cfg_attr(test, mockall::automock)]
pub trait EventPublisher: Send + Sync {
    /// Enqueue a record for delivery.
    ///
    /// Returns once the record is buffered by the client. An error means the
    /// record could not even be enqueued; delivery failures after that point
    /// are logged by the implementation.
    fn publish(&self, record: &OutboundRecord) -> Result<()>;
}

/// Inbound side of the event log
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Wait up to the source's poll timeout for the next record payload.
    ///
    /// `Ok(None)` means nothing arrived within the timeout.
    async fn poll(&self) -> Result<Option<Vec<u8>>>;
}

/// Classification of a record read from the shared topic
///
/// Identifiers and reports share one topic by default, so every consumed
/// payload goes through this policy before it can reach the membership store.
/// Only `Identifier` records are merged; everything else is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicRecord {
    Identifier(RequestId),
    Report(u64),
    Unrecognized,
}

impl TopicRecord {
    pub fn classify(payload: &[u8]) -> Self {
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text,
            Err(_) => return TopicRecord::Unrecognized,
        };

        if let Ok(id) = text.parse::<RequestId>() {
            return TopicRecord::Identifier(id);
        }

        match ReportEvent::parse_count(text) {
            Some(count) => TopicRecord::Report(count),
            None => TopicRecord::Unrecognized,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            TopicRecord::Identifier(_) => "identifier",
            TopicRecord::Report(_) => "report",
            TopicRecord::Unrecognized => "unrecognized",
        }
    }
}

/// Publishing half of the bridge, shared by ingress and the aggregator
#[derive(Clone)]
pub struct EventBridge {
    publisher: Arc<dyn EventPublisher>,
    identifier_topic: String,
    report_topic: String,
}

impl EventBridge {
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        identifier_topic: impl Into<String>,
        report_topic: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            identifier_topic: identifier_topic.into(),
            report_topic: report_topic.into(),
        }
    }

    /// Fire-and-forget publish of an accepted identifier.
    pub fn publish_identifier(&self, id: RequestId) {
        let payload = id.to_string();
        let record = OutboundRecord {
            topic: self.identifier_topic.clone(),
            key: Some(payload.clone()),
            payload,
        };

        if let Err(e) = self.publisher.publish(&record) {
            metrics::PUBLISH_FAILURES.with_label_values(&["enqueue"]).inc();
            warn!(
                request_id = %id,
                topic = %self.identifier_topic,
                error = %e,
                "Failed to publish identifier"
            );
        }
    }

    pub fn publish_report(&self, report: &ReportEvent) -> Result<()> {
        let record = OutboundRecord {
            topic: self.report_topic.clone(),
            key: None,
            payload: report.to_line(),
        };

        self.publisher.publish(&record).map_err(|e| {
            metrics::PUBLISH_FAILURES.with_label_values(&["enqueue"]).inc();
            e
        })
    }

    pub fn identifier_topic(&self) -> &str {
        &self.identifier_topic
    }

    pub fn report_topic(&self) -> &str {
        &self.report_topic
    }
}

/// Consuming half of the bridge
///
/// Polls the identifier topic and merges every identifier into the local
/// membership store. Runs until the shutdown signal fires; poll failures and
/// malformed records are logged and skipped.
pub struct MembershipMerger {
    source: Arc<dyn RecordSource>,
    membership: MembershipStore,
    retry_delay: Duration,
}

impl MembershipMerger {
    /// # Arguments
    /// * `source` - Record source subscribed to the identifier topic
    /// * `membership` - Store to merge identifiers into
    /// * `retry_delay` - Pause after a failed poll (the poll interval)
    pub fn new(
        source: Arc<dyn RecordSource>,
        membership: MembershipStore,
        retry_delay: Duration,
    ) -> Self {
        Self {
            source,
            membership,
            retry_delay,
        }
    }

    /// Merge a single consumed payload.
    ///
    /// Returns the classification so callers can tell what happened.
    pub fn apply(&self, payload: &[u8]) -> TopicRecord {
        let record = TopicRecord::classify(payload);
        metrics::RECORDS_CONSUMED
            .with_label_values(&[record.kind()])
            .inc();

        match record {
            TopicRecord::Identifier(id) => {
                if self.membership.observe(id, Origin::Remote) {
                    metrics::REMOTE_MERGES.inc();
                    debug!(request_id = %id, "Merged identifier from event log");
                }
            }
            TopicRecord::Report(count) => {
                debug!(count, "Skipping report record on identifier topic");
            }
            TopicRecord::Unrecognized => {
                debug!(
                    payload_len = payload.len(),
                    "Skipping unrecognized record on identifier topic"
                );
            }
        }

        record
    }

    /// Spawn the merge loop.
    ///
    /// The loop exits when `shutdown` changes or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Membership merge loop started");

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("Membership merge loop received shutdown signal");
                        break;
                    }
                    polled = self.source.poll() => match polled {
                        Ok(Some(payload)) => {
                            self.apply(&payload);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            metrics::POLL_FAILURES.inc();
                            error!(error = %e, "Event log poll failed");
                            tokio::time::sleep(self.retry_delay).await;
                        }
                    }
                }
            }

            info!("Membership merge loop stopped");
        })
    }
}
