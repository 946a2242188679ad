//! Process-local event bus
//!
//! Fans every published record out to every subscriber of the same topic.
//! Used when `event_bus = memory` and to wire several bridges together in tests.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::debug;

use super::{EventPublisher, OutboundRecord, RecordSource};
use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct InMemoryBus {
    tx: broadcast::Sender<OutboundRecord>,
}

impl InMemoryBus {
    /// `capacity` is the number of records a slow subscriber may fall behind
    /// before it starts losing records.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to `topic`. Only records published after this call are seen.
    pub fn subscribe(&self, topic: impl Into<String>, poll_timeout: Duration) -> InMemoryRecordSource {
        InMemoryRecordSource {
            rx: Mutex::new(self.tx.subscribe()),
            topic: topic.into(),
            poll_timeout,
        }
    }
}

impl EventPublisher for InMemoryBus {
    fn publish(&self, record: &OutboundRecord) -> Result<()> {
        // No subscribers is not an error for a bus.
        if self.tx.send(record.clone()).is_err() {
            debug!(topic = %record.topic, "Record published with no subscribers");
        }
        Ok(())
    }
}

pub struct InMemoryRecordSource {
    rx: Mutex<broadcast::Receiver<OutboundRecord>>,
    topic: String,
    poll_timeout: Duration,
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn poll(&self) -> Result<Option<Vec<u8>>> {
        let mut rx = self.rx.lock().await;

        let next = async {
            loop {
                match rx.recv().await {
                    Ok(record) if record.topic == self.topic => {
                        return Ok(record.payload.into_bytes())
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(e),
                }
            }
        };

        match timeout(self.poll_timeout, next).await {
            Err(_) => Ok(None),
            Ok(Ok(payload)) => Ok(Some(payload)),
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => Err(AppError::EventBus(
                format!("subscriber lagged, {} records skipped", skipped),
            )),
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                Err(AppError::EventBus("bus closed".to_string()))
            }
        }
    }
}
