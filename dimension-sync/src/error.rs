use thiserror::Error;

use crate::catalog::CatalogError;
use crate::redis::CacheError;
use crate::types::DimensionKind;

/// Decode-time failures. The event is dropped before any side effect.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed change event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{0} change event is missing product_id")]
    MissingProductId(DimensionKind),
}

/// A single event's handling failed. The event is abandoned (no retry, no
/// downstream notification) and the engine keeps consuming; redelivery, if
/// any, is the broker's business.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{kind} fetch failed for id {id}: {source}")]
    Fetch {
        kind: DimensionKind,
        id: i64,
        source: CatalogError,
    },

    #[error("batched brand fetch failed for ids [{ids}]: {source}")]
    BatchFetch { ids: String, source: CatalogError },

    #[error("cache write failed for {key}: {source}")]
    Cache { key: String, source: CacheError },
}
