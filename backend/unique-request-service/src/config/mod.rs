use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Duration;

/// Which event bus backs the event bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventBusKind {
    Kafka,
    /// Process-local bus; records never leave this instance.
    Memory,
}

/// Whether the ingress handler waits for the callback round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackMode {
    /// Response is sent after the callback completes.
    Inline,
    /// Callback runs on a spawned task; response is sent immediately.
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // HTTP server config
    pub http_host: String,
    pub http_port: u16,

    // Event bridge
    pub event_bus: EventBusKind,
    pub kafka_brokers: String,
    pub kafka_topic: String,
    pub report_topic: Option<String>,
    pub consumer_group: Option<String>,
    pub consumer_offset_reset: String,
    pub poll_interval_ms: u64,

    // Aggregator
    pub flush_interval_secs: u64,
    pub report_log_path: String,

    // Callback dispatcher
    pub callback_timeout_secs: u64,
    pub callback_mode: CallbackMode,

    // Observability
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .set_default("http_host", "0.0.0.0")?
            .set_default("http_port", 8080)?
            .set_default("event_bus", "kafka")?
            .set_default("kafka_brokers", "localhost:9092")?
            .set_default("kafka_topic", "unique-requests")?
            .set_default("consumer_offset_reset", "latest")?
            .set_default("poll_interval_ms", 100)?
            .set_default("flush_interval_secs", 60)?
            .set_default("report_log_path", "unique_requests.log")?
            .set_default("callback_timeout_secs", 10)?
            .set_default("callback_mode", "inline")?
            .set_default("log_level", "info")?
            .set_default("log_format", "text")?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_port == 0 {
            return Err(anyhow!("HTTP port must be greater than 0"));
        }

        if self.kafka_topic.trim().is_empty() {
            return Err(anyhow!("Kafka topic is required"));
        }

        if self.event_bus == EventBusKind::Kafka && self.kafka_brokers.trim().is_empty() {
            return Err(anyhow!("Kafka brokers are required when event_bus=kafka"));
        }

        if !matches!(
            self.consumer_offset_reset.as_str(),
            "earliest" | "latest"
        ) {
            return Err(anyhow!(
                "consumer_offset_reset must be 'earliest' or 'latest', got '{}'",
                self.consumer_offset_reset
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow!("Poll interval must be greater than 0"));
        }

        if self.flush_interval_secs == 0 {
            return Err(anyhow!("Flush interval must be greater than 0"));
        }

        if self.report_log_path.trim().is_empty() {
            return Err(anyhow!("Report log path is required"));
        }

        if self.callback_timeout_secs == 0 {
            return Err(anyhow!("Callback timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Topic that report events are published to.
    pub fn report_topic(&self) -> &str {
        self.report_topic
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.kafka_topic)
    }

    /// Consumer group for the membership merge loop.
    ///
    /// Every instance needs its own group so that each one reads every
    /// partition of the topic.
    pub fn consumer_group(&self, instance_id: &str) -> String {
        match self.consumer_group.as_deref() {
            Some(group) if !group.trim().is_empty() => group.to_string(),
            _ => format!("unique-request-service-{}", instance_id),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}
