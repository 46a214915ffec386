use envconfig::Envconfig;

use crate::types::DimensionKind;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(from = "KAFKA_CONSUMER_TOPIC", default = "data_change_events")]
    pub kafka_consumer_topic: String,

    #[envconfig(from = "KAFKA_CONSUMER_GROUP", default = "dimension-sync-rs")]
    pub kafka_consumer_group: String,

    #[envconfig(from = "NOTIFICATION_TOPIC", default = "aggr_data_change_events")]
    pub notification_topic: String,

    #[envconfig(from = "CATALOG_SERVICE_URL", default = "http://localhost:3500")]
    pub catalog_service_url: String,

    #[envconfig(from = "CATALOG_TIMEOUT_MS", default = "5000")]
    pub catalog_timeout_ms: u64,

    pub redis_url: String,

    #[envconfig(from = "FLUSH_INTERVAL_MS", default = "100")]
    pub flush_interval_ms: u64,

    // Brand add/update events accumulate until this many are pending, then
    // resolve through one batched catalog call.
    #[envconfig(from = "BRAND_BATCH_SIZE", default = "2")]
    pub brand_batch_size: usize,

    #[envconfig(from = "WORKER_LOOP_COUNT", default = "4")]
    pub worker_loop_count: usize,

    #[envconfig(from = "BIND_HOST", default = "::")]
    pub bind_host: String,

    #[envconfig(from = "BIND_PORT", default = "3305")]
    pub bind_port: u16,

    // Log notifications instead of producing to kafka, for local runs.
    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(nested = true)]
    pub cache_prefixes: CachePrefixes,
}

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message: 20 seconds
}

/// Per-kind cache key prefixes. Defaults match the kinds' wire names; keys
/// come out as `<prefix>_<id>`.
#[derive(Envconfig, Clone)]
pub struct CachePrefixes {
    #[envconfig(from = "CACHE_PREFIX_BRAND", default = "brand")]
    pub brand: String,

    #[envconfig(from = "CACHE_PREFIX_CATEGORY", default = "category")]
    pub category: String,

    #[envconfig(from = "CACHE_PREFIX_PRODUCT", default = "product")]
    pub product: String,

    #[envconfig(from = "CACHE_PREFIX_PRODUCT_INTRO", default = "product_intro")]
    pub product_intro: String,

    #[envconfig(from = "CACHE_PREFIX_PRODUCT_PROPERTY", default = "product_property")]
    pub product_property: String,

    #[envconfig(
        from = "CACHE_PREFIX_PRODUCT_SPECIFICATION",
        default = "product_specification"
    )]
    pub product_specification: String,
}

impl CachePrefixes {
    /// Derive the cache key for a (kind, key-id) pair. Distinct prefixes
    /// keep kinds from colliding on shared ids.
    pub fn key(&self, kind: DimensionKind, id: i64) -> String {
        let prefix = match kind {
            DimensionKind::Brand => &self.brand,
            DimensionKind::Category => &self.category,
            DimensionKind::Product => &self.product,
            DimensionKind::ProductIntro => &self.product_intro,
            DimensionKind::ProductProperty => &self.product_property,
            DimensionKind::ProductSpecification => &self.product_specification,
        };
        format!("{prefix}_{id}")
    }
}

impl Default for CachePrefixes {
    fn default() -> Self {
        Self {
            brand: "brand".to_string(),
            category: "category".to_string(),
            product: "product".to_string(),
            product_intro: "product_intro".to_string(),
            product_property: "product_property".to_string(),
            product_specification: "product_specification".to_string(),
        }
    }
}
