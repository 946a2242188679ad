/// Prometheus metrics for the unique request pipeline
use actix_web::{HttpResponse, Responder};
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Ingress requests (labels: outcome = new | duplicate | rejected | error)
    pub static ref ACCEPT_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "unique_requests_accept_total",
        "Total number of ingress requests by outcome",
        &["outcome"]
    )
    .expect("unique_requests_accept_total metric registration");

    pub static ref MEMBERSHIP_SIZE: IntGauge = register_int_gauge!(
        "unique_requests_membership_size",
        "Number of identifiers held in the membership store"
    )
    .expect("unique_requests_membership_size metric registration");

    /// Records consumed from the event log (labels: kind = identifier | report | unrecognized)
    pub static ref RECORDS_CONSUMED: IntCounterVec = register_int_counter_vec!(
        "unique_requests_records_consumed_total",
        "Total number of event log records consumed by kind",
        &["kind"]
    )
    .expect("unique_requests_records_consumed_total metric registration");

    /// Identifiers first learned from the event log rather than local ingress
    pub static ref REMOTE_MERGES: IntCounter = register_int_counter!(
        "unique_requests_remote_merges_total",
        "Total number of identifiers merged from the event log"
    )
    .expect("unique_requests_remote_merges_total metric registration");

    pub static ref POLL_FAILURES: IntCounter = register_int_counter!(
        "unique_requests_poll_failures_total",
        "Total number of failed event log polls"
    )
    .expect("unique_requests_poll_failures_total metric registration");

    /// Failed publishes (labels: stage = enqueue | delivery)
    pub static ref PUBLISH_FAILURES: IntCounterVec = register_int_counter_vec!(
        "unique_requests_publish_failures_total",
        "Total number of failed event log publishes",
        &["stage"]
    )
    .expect("unique_requests_publish_failures_total metric registration");

    /// Callback dispatches (labels: result = success | rejected | transport_error)
    pub static ref CALLBACKS: IntCounterVec = register_int_counter_vec!(
        "unique_requests_callbacks_total",
        "Total number of callback dispatches by result",
        &["result"]
    )
    .expect("unique_requests_callbacks_total metric registration");

    /// Aggregator ticks (labels: status = success | failed)
    pub static ref AGGREGATOR_TICKS: IntCounterVec = register_int_counter_vec!(
        "unique_requests_aggregator_ticks_total",
        "Total number of aggregator flushes by status",
        &["status"]
    )
    .expect("unique_requests_aggregator_ticks_total metric registration");

    /// Count carried by the most recent report
    pub static ref LAST_REPORTED_COUNT: IntGauge = register_int_gauge!(
        "unique_requests_last_reported_count",
        "Unique request count carried by the most recent report"
    )
    .expect("unique_requests_last_reported_count metric registration");
}

/// Handler that serialises Prometheus metrics in text format.
pub async fn metrics_handler() -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => HttpResponse::Ok()
            .content_type(encoder.format_type())
            .body(buffer),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}
