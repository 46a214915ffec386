pub const EVENTS_RECEIVED: &str = "dimension_sync_events_received";
pub const EVENT_PARSE_ERROR: &str = "dimension_sync_event_parse_error";
pub const EMPTY_EVENTS: &str = "dimension_sync_empty_events";
pub const SYNC_FAILED: &str = "dimension_sync_failed_events";
pub const CACHE_WRITES: &str = "dimension_sync_cache_writes";
pub const CACHE_DELETES: &str = "dimension_sync_cache_deletes";
pub const NOTIFICATIONS_QUEUED: &str = "dimension_sync_notifications_queued";
pub const NOTIFICATIONS_DEDUPED: &str = "dimension_sync_notifications_deduped";
pub const NOTIFICATIONS_PUBLISHED: &str = "dimension_sync_notifications_published";
pub const PUBLISH_FAILED: &str = "dimension_sync_publish_failed";
pub const FLUSH_CYCLES: &str = "dimension_sync_flush_cycles";
pub const BRAND_BATCH_FETCHES: &str = "dimension_sync_brand_batch_fetches";
pub const BRAND_BATCH_SIZE: &str = "dimension_sync_brand_batch_size";
pub const BRAND_BATCH_SHORTFALL: &str = "dimension_sync_brand_batch_shortfall";
