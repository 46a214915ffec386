use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use thiserror::Error;
use tracing::info;

use crate::config::KafkaConfig;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to publish to kafka: {0}")]
    Kafka(#[from] KafkaError),

    #[error("notification sink unavailable: {0}")]
    Unavailable(String),
}

/// Downstream transport for deduplicated dimension-change notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError>;
}

pub struct KafkaSink {
    producer: FutureProducer,
}

impl KafkaSink {
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            );

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        let producer: FutureProducer = client_config.create()?;

        // "Ping" the brokers by requesting metadata, so misconfiguration
        // fails at startup rather than on the first flush
        let metadata = producer
            .client()
            .fetch_metadata(None, Duration::from_secs(15))?;
        info!(
            "Connected to kafka brokers, found {} topics",
            metadata.topics().len()
        );

        Ok(Self { producer })
    }
}

#[async_trait]
impl NotificationSink for KafkaSink {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError> {
        let record = FutureRecord::<str, _> {
            topic,
            partition: None,
            payload: Some(&payload),
            key: None,
            timestamp: None,
            headers: None,
        };
        match self.producer.send(record, Timeout::Never).await {
            Ok(_) => Ok(()),
            Err((err, _)) => Err(PublishError::Kafka(err)),
        }
    }
}

pub struct PrintSink;

#[async_trait]
impl NotificationSink for PrintSink {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError> {
        info!("notification for {topic}: {payload}");
        Ok(())
    }
}

/// Test double: records publishes, with one-shot per-payload failure
/// injection so retry paths can observe eventual success.
#[derive(Clone, Default)]
pub struct MemorySink {
    published: Arc<Mutex<Vec<(String, String)>>>,
    fail_once: Arc<Mutex<HashSet<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_once(&self, payload: &str) -> Self {
        lock(&self.fail_once).insert(payload.to_owned());
        self.clone()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        lock(&self.published).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError> {
        if lock(&self.fail_once).remove(&payload) {
            return Err(PublishError::Unavailable("injected failure".to_string()));
        }
        lock(&self.published).push((topic.to_owned(), payload));
        Ok(())
    }
}
