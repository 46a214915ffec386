use std::sync::Arc;
use std::time::Duration;

use envconfig::Envconfig;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use dimension_sync::catalog::HttpCatalogClient;
use dimension_sync::config::Config;
use dimension_sync::consumer::{worker_loop, ChangeEventConsumer};
use dimension_sync::engine::SyncEngine;
use dimension_sync::flush::flush_loop;
use dimension_sync::redis::RedisCacheClient;
use dimension_sync::server::{health_router, serve};
use dimension_sync::sink::{KafkaSink, NotificationSink, PrintSink};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
            .add_directive("rdkafka=warn".parse().unwrap()),
    );
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    setup_tracing();
    info!("Starting dimension sync...");

    let config = Config::init_from_env()?;

    info!(
        topic = config.kafka_consumer_topic,
        group = config.kafka_consumer_group,
        notification_topic = config.notification_topic,
        catalog = config.catalog_service_url,
        "Configuration loaded"
    );

    // Health check + metrics server
    let bind = format!("{}:{}", config.bind_host, config.bind_port);
    let router = health_router();
    tokio::task::spawn(async move {
        serve(router, &bind)
            .await
            .expect("failed to start health server");
    });

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let cache = Arc::new(RedisCacheClient::new(config.redis_url.clone()).await?);
    let catalog = Arc::new(HttpCatalogClient::new(
        config.catalog_service_url.clone(),
        Duration::from_millis(config.catalog_timeout_ms),
    )?);
    let sink: Arc<dyn NotificationSink> = if config.print_sink {
        Arc::new(PrintSink)
    } else {
        Arc::new(KafkaSink::new(&config.kafka)?)
    };

    let engine = Arc::new(SyncEngine::new(
        cache,
        catalog,
        sink,
        config.cache_prefixes.clone(),
        config.notification_topic.clone(),
        config.brand_batch_size,
    ));

    let consumer = ChangeEventConsumer::new(&config)?;

    let mut handles = Vec::new();
    for _ in 0..config.worker_loop_count {
        handles.push(tokio::spawn(worker_loop(
            consumer.clone(),
            engine.clone(),
            shutdown_rx.clone(),
        )));
    }
    handles.push(tokio::spawn(flush_loop(
        engine.clone(),
        Duration::from_millis(config.flush_interval_ms),
        shutdown_rx.clone(),
    )));

    for handle in handles {
        handle.await?;
    }

    info!("Dimension sync shut down");
    Ok(())
}
