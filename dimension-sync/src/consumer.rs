use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::{ClientConfig, Message};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::SyncEngine;
use crate::metrics_consts::{EMPTY_EVENTS, EVENTS_RECEIVED, EVENT_PARSE_ERROR, SYNC_FAILED};
use crate::types::ChangeEvent;

/// Cloneable handle over one subscribed stream consumer, shared by all
/// worker loops.
#[derive(Clone)]
pub struct ChangeEventConsumer {
    inner: Arc<StreamConsumer>,
}

impl ChangeEventConsumer {
    pub fn new(config: &Config) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka.kafka_hosts)
            .set("group.id", &config.kafka_consumer_group)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true");

        if config.kafka.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[config.kafka_consumer_topic.as_str()])?;

        info!(
            topic = config.kafka_consumer_topic,
            group = config.kafka_consumer_group,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            inner: Arc::new(consumer),
        })
    }

    pub async fn recv_payload(&self) -> Result<Option<Vec<u8>>, KafkaError> {
        let message = self.inner.recv().await?;
        Ok(message.payload().map(|p| p.to_vec()))
    }
}

/// One dispatch worker: receive, decode, hand to the engine. Every
/// per-event failure is logged and counted; only the shutdown signal ends
/// the loop.
pub async fn worker_loop(
    consumer: ChangeEventConsumer,
    engine: Arc<SyncEngine>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let payload = tokio::select! {
            recv = consumer.recv_payload() => match recv {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    warn!("received empty payload");
                    counter!(EMPTY_EVENTS).increment(1);
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "kafka recv failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("worker loop stopping");
                    return;
                }
                continue;
            }
        };

        counter!(EVENTS_RECEIVED).increment(1);

        let event = match ChangeEvent::from_payload(&payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dropping malformed change event");
                counter!(EVENT_PARSE_ERROR).increment(1);
                continue;
            }
        };

        if let Err(e) = engine.process(event).await {
            warn!(error = %e, "change event sync failed");
            counter!(SYNC_FAILED).increment(1);
        }
    }
}
