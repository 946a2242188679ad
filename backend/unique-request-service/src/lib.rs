//! Unique request counting service
//!
//! Accepts numeric request identifiers over HTTP, deduplicates them against
//! every identifier seen by any instance, counts first-time identifiers per
//! flush interval and reports the count to a log file and a Kafka topic.
//!
//! ```text
//! HTTP ingress ──▶ UniqueRequestService ──▶ MembershipStore (dedup)
//!        │                 │                      ▲
//!        │                 ├──▶ UniqueCounter ──▶ Aggregator ──▶ report log + topic
//!        │                 └──▶ EventBridge ──▶ topic ──▶ MembershipMerger
//!        └──▶ CallbackDispatcher ──▶ caller endpoint
//! ```

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;

use config::CallbackMode;
use services::{CallbackDispatcher, UniqueRequestService};

/// Shared state handed to every HTTP worker
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<UniqueRequestService>,
    pub callbacks: CallbackDispatcher,
    pub callback_mode: CallbackMode,
}

impl AppState {
    pub fn new(
        service: Arc<UniqueRequestService>,
        callbacks: CallbackDispatcher,
        callback_mode: CallbackMode,
    ) -> Self {
        Self {
            service,
            callbacks,
            callback_mode,
        }
    }
}
