use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashSet;
use metrics::{counter, histogram};
use tracing::{error, warn};

use crate::catalog::CatalogClient;
use crate::config::CachePrefixes;
use crate::error::SyncError;
use crate::metrics_consts::{
    BRAND_BATCH_FETCHES, BRAND_BATCH_SHORTFALL, BRAND_BATCH_SIZE, CACHE_DELETES, CACHE_WRITES,
    NOTIFICATIONS_DEDUPED, NOTIFICATIONS_PUBLISHED, NOTIFICATIONS_QUEUED, PUBLISH_FAILED,
    SYNC_FAILED,
};
use crate::redis::CacheClient;
use crate::sink::NotificationSink;
use crate::types::{ChangeEvent, ChangeKind, DimensionKind, DimensionType, Notification};

/// The change-event dispatch, batching, dedup and flush engine.
///
/// Handlers run concurrently on the consumer worker tasks and share this
/// struct through an `Arc`; the flush loop drains the pending set from its
/// own task. All clients are injected at construction.
pub struct SyncEngine {
    cache: Arc<dyn CacheClient>,
    catalog: Arc<dyn CatalogClient>,
    sink: Arc<dyn NotificationSink>,
    prefixes: CachePrefixes,
    notification_topic: String,
    brand_batch_size: usize,

    // Ids of brand add/update events awaiting a batched resolve. The async
    // mutex spans append, threshold check, batch fetch and clear, so
    // concurrent brand events can neither double-resolve buffered ids nor
    // lose appends.
    brand_buffer: tokio::sync::Mutex<Vec<i64>>,

    // Pending downstream notifications; value identity is the dedup key.
    // Guarded by a std mutex, never held across an await.
    pending: Mutex<AHashSet<Notification>>,
}

impl SyncEngine {
    pub fn new(
        cache: Arc<dyn CacheClient>,
        catalog: Arc<dyn CatalogClient>,
        sink: Arc<dyn NotificationSink>,
        prefixes: CachePrefixes,
        notification_topic: String,
        brand_batch_size: usize,
    ) -> Self {
        Self {
            cache,
            catalog,
            sink,
            prefixes,
            notification_topic,
            brand_batch_size: brand_batch_size.max(1),
            brand_buffer: tokio::sync::Mutex::new(Vec::new()),
            pending: Mutex::new(AHashSet::new()),
        }
    }

    /// Dispatch one decoded event to the handler for its kind.
    pub async fn process(&self, event: ChangeEvent) -> Result<(), SyncError> {
        match event.data_type {
            DimensionKind::Brand => self.handle_brand(&event).await,
            DimensionKind::Category
            | DimensionKind::Product
            | DimensionKind::ProductIntro
            | DimensionKind::ProductProperty
            | DimensionKind::ProductSpecification => self.handle_single(&event).await,
        }
    }

    /// Handler for every kind except brand: resolve against the catalog on
    /// add/update, drop the cache entry on delete, then queue the coarse
    /// notification. A fetch or cache failure abandons this event only and
    /// skips the notification, keeping cache and downstream consistent.
    async fn handle_single(&self, event: &ChangeEvent) -> Result<(), SyncError> {
        let kind = event.data_type;
        let key = self.prefixes.key(kind, event.key_id());

        match event.event_type {
            ChangeKind::Add | ChangeKind::Update => {
                let record = self
                    .catalog
                    .fetch_by_id(kind, event.id)
                    .await
                    .map_err(|source| SyncError::Fetch {
                        kind,
                        id: event.id,
                        source,
                    })?;
                self.cache
                    .set(key.clone(), record.to_string())
                    .await
                    .map_err(|source| SyncError::Cache { key, source })?;
                counter!(CACHE_WRITES).increment(1);
            }
            ChangeKind::Delete => {
                self.cache
                    .del(key.clone())
                    .await
                    .map_err(|source| SyncError::Cache { key, source })?;
                counter!(CACHE_DELETES).increment(1);
            }
        }

        self.queue_notification(Notification::new(kind.dimension_type(), event.key_id()));
        Ok(())
    }

    /// Brand handler. Add/update events buffer for a batched resolve;
    /// deletes act immediately and never touch the buffer.
    async fn handle_brand(&self, event: &ChangeEvent) -> Result<(), SyncError> {
        match event.event_type {
            ChangeKind::Add | ChangeKind::Update => self.buffer_brand(event.id).await,
            ChangeKind::Delete => {
                let key = self.prefixes.key(DimensionKind::Brand, event.id);
                self.cache
                    .del(key.clone())
                    .await
                    .map_err(|source| SyncError::Cache { key, source })?;
                counter!(CACHE_DELETES).increment(1);
                self.queue_notification(Notification::new(DimensionType::Brand, event.id));
                Ok(())
            }
        }
    }

    async fn buffer_brand(&self, id: i64) -> Result<(), SyncError> {
        let mut buffer = self.brand_buffer.lock().await;
        buffer.push(id);
        if buffer.len() < self.brand_batch_size {
            return Ok(());
        }

        let ids = buffer
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let submitted = buffer.len();

        let result = self.catalog.fetch_brands_by_ids(&ids).await;

        // The buffer is spent whether or not the resolve succeeded; the
        // engine never retries a fetch, the upstream will re-emit changes
        // that matter.
        buffer.clear();
        drop(buffer);

        counter!(BRAND_BATCH_FETCHES).increment(1);
        histogram!(BRAND_BATCH_SIZE).record(submitted as f64);

        let records = match result {
            Ok(records) => records,
            Err(source) => {
                error!("dropping brand batch [{ids}]: {source}");
                return Err(SyncError::BatchFetch { ids, source });
            }
        };

        if records.len() < submitted {
            warn!(
                requested = submitted,
                returned = records.len(),
                "brand batch resolve returned fewer records than ids, dropping the missing ids"
            );
            counter!(BRAND_BATCH_SHORTFALL).increment((submitted - records.len()) as u64);
        }

        for record in records {
            let Some(id) = record.get("id").and_then(|v| v.as_i64()) else {
                warn!("brand record without a numeric id, skipping");
                counter!(SYNC_FAILED).increment(1);
                continue;
            };

            let key = self.prefixes.key(DimensionKind::Brand, id);
            // A failed upsert abandons this record only; its siblings in
            // the batch still apply.
            if let Err(source) = self.cache.set(key.clone(), record.to_string()).await {
                warn!("cache write failed for {key}: {source}");
                counter!(SYNC_FAILED).increment(1);
                continue;
            }
            counter!(CACHE_WRITES).increment(1);
            self.queue_notification(Notification::new(DimensionType::Brand, id));
        }

        Ok(())
    }

    fn queue_notification(&self, notification: Notification) {
        let mut pending = lock(&self.pending);
        if pending.insert(notification) {
            counter!(NOTIFICATIONS_QUEUED).increment(1);
        } else {
            counter!(NOTIFICATIONS_DEDUPED).increment(1);
        }
    }

    /// Drain the pending set and publish every member, order unspecified.
    /// The drain is an atomic exchange with a fresh set, so inserts racing
    /// a flush land in the next cycle. Members whose publish fails go back
    /// into the set and retry next cycle; nothing is published twice within
    /// one cycle. Returns the number published.
    pub async fn flush_pending(&self) -> usize {
        let drained: Vec<Notification> = {
            let mut pending = lock(&self.pending);
            if pending.is_empty() {
                return 0;
            }
            mem::take(&mut *pending).into_iter().collect()
        };

        let mut published = 0;
        for notification in drained {
            let payload = notification.encode();
            match self.sink.publish(&self.notification_topic, payload).await {
                Ok(()) => {
                    published += 1;
                    counter!(NOTIFICATIONS_PUBLISHED).increment(1);
                }
                Err(err) => {
                    warn!("notification publish failed, retrying next cycle: {err}");
                    counter!(PUBLISH_FAILED).increment(1);
                    lock(&self.pending).insert(notification);
                }
            }
        }
        published
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub async fn buffered_brand_count(&self) -> usize {
        self.brand_buffer.lock().await.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
