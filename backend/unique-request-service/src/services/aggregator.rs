use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::metrics;
use crate::models::ReportEvent;
use crate::services::report_log::ReportSink;
use crate::services::unique_requests::UniqueRequestService;

/// Periodic flush of the unique counter
///
/// Every `interval` (scheduled from start, first tick one interval in) the
/// counter is drained with a single atomic swap and the count is written to
/// the process log, the event log and the report sink. Ticks run one at a
/// time on a single task. A failing or panicking tick is logged and the
/// schedule carries on.
pub struct Aggregator {
    service: Arc<UniqueRequestService>,
    sink: Arc<dyn ReportSink>,
    interval: Duration,
}

impl Aggregator {
    pub fn new(
        service: Arc<UniqueRequestService>,
        sink: Arc<dyn ReportSink>,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            sink,
            interval,
        }
    }

    /// Run a single flush and return the report it produced.
    pub async fn flush(&self) -> ReportEvent {
        let report = ReportEvent::new(self.service.counter().drain());
        let line = report.to_line();
        let mut failed = false;

        info!(count = report.count, "{}", line);
        metrics::LAST_REPORTED_COUNT.set(report.count as i64);

        // Logged and published before the sink write, so a sink failure
        // cannot lose the drained count.
        if let Err(e) = self.service.bridge().publish_report(&report) {
            failed = true;
            warn!(
                topic = %self.service.bridge().report_topic(),
                error = %e,
                "Failed to publish report"
            );
        }

        if let Err(e) = self.sink.write_line(&line).await {
            failed = true;
            error!(error = %e, "Failed to write report to log sink");
        }

        let status = if failed { "failed" } else { "success" };
        metrics::AGGREGATOR_TICKS.with_label_values(&[status]).inc();

        report
    }

    /// Spawn the periodic flush task.
    ///
    /// The task exits when `shutdown` changes or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                "Aggregator started"
            );

            let mut timer = interval_at(Instant::now() + self.interval, self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("Aggregator received shutdown signal");
                        break;
                    }
                    _ = timer.tick() => {
                        if AssertUnwindSafe(self.flush()).catch_unwind().await.is_err() {
                            metrics::AGGREGATOR_TICKS.with_label_values(&["failed"]).inc();
                            error!("Aggregator tick panicked; continuing with next tick");
                        }
                    }
                }
            }

            info!("Aggregator stopped");
        })
    }
}
