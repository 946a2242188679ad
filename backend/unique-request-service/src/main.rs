use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unique_request_service::config::{Config, EventBusKind, LogFormat};
use unique_request_service::handlers::configure_routes;
use unique_request_service::services::event_bridge::{
    InMemoryBus, KafkaEventPublisher, KafkaRecordSource,
};
use unique_request_service::services::{
    Aggregator, CallbackDispatcher, EventBridge, EventPublisher, FileReportSink,
    MembershipMerger, RecordSource, UniqueRequestService,
};
use unique_request_service::AppState;
use uuid::Uuid;

// Records a memory-bus subscriber may fall behind before it starts skipping.
const MEMORY_BUS_CAPACITY: usize = 10_000;

#[actix_web::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config);
    config.validate().context("Invalid configuration")?;

    let instance_id = Uuid::new_v4().to_string();
    tracing::info!(instance_id = %instance_id, "Starting unique-request-service");

    let (publisher, source): (Arc<dyn EventPublisher>, Arc<dyn RecordSource>) =
        match config.event_bus {
            EventBusKind::Kafka => {
                let group_id = config.consumer_group(&instance_id);
                tracing::info!(
                    "Connecting event bridge to Kafka (brokers: {}, topic: {}, group: {})",
                    config.kafka_brokers,
                    config.kafka_topic,
                    group_id
                );

                let publisher = KafkaEventPublisher::new(&config.kafka_brokers)
                    .context("Failed to create Kafka producer")?;
                let source = KafkaRecordSource::new(
                    &config.kafka_brokers,
                    &group_id,
                    &config.kafka_topic,
                    &config.consumer_offset_reset,
                    config.poll_interval(),
                )
                .context("Failed to create Kafka consumer")?;

                let publisher: Arc<dyn EventPublisher> = Arc::new(publisher);
                let source: Arc<dyn RecordSource> = Arc::new(source);
                (publisher, source)
            }
            EventBusKind::Memory => {
                tracing::warn!(
                    "Using in-memory event bus; identifiers are not shared between instances"
                );
                let bus = InMemoryBus::new(MEMORY_BUS_CAPACITY);
                let source: Arc<dyn RecordSource> =
                    Arc::new(bus.subscribe(config.kafka_topic.clone(), config.poll_interval()));
                let publisher: Arc<dyn EventPublisher> = Arc::new(bus);
                (publisher, source)
            }
        };

    let bridge = EventBridge::new(publisher, config.kafka_topic.clone(), config.report_topic());
    let service = Arc::new(UniqueRequestService::new(bridge));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let merger = MembershipMerger::new(
        source,
        service.membership().clone(),
        config.poll_interval(),
    )
    .spawn(shutdown_rx.clone());

    let report_sink = Arc::new(FileReportSink::new(&config.report_log_path));
    tracing::info!(
        "Starting aggregator (interval: {}s, log: {})",
        config.flush_interval_secs,
        config.report_log_path
    );
    let aggregator =
        Aggregator::new(service.clone(), report_sink, config.flush_interval()).spawn(shutdown_rx);

    let callbacks = CallbackDispatcher::new(config.callback_timeout())
        .context("Failed to create callback HTTP client")?;
    let state = web::Data::new(AppState::new(service, callbacks, config.callback_mode));

    tracing::info!(
        "Starting HTTP server on {}:{}",
        config.http_host,
        config.http_port
    );

    // Stops on SIGINT/SIGTERM.
    let server_result = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(state.clone())
            .configure(configure_routes)
    })
    .bind((config.http_host.as_str(), config.http_port))
    .context("Failed to bind HTTP server")?
    .run()
    .await
    .context("HTTP server error");

    tracing::info!("HTTP server stopped, shutting down background tasks");
    let _ = shutdown_tx.send(true);

    if let Err(e) = merger.await {
        tracing::error!("Membership merge loop terminated abnormally: {}", e);
    }
    if let Err(e) = aggregator.await {
        tracing::error!("Aggregator terminated abnormally: {}", e);
    }

    server_result
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{},actix_web=info,unique_request_service={}",
            config.log_level, config.log_level
        )
        .into()
    });

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}
