use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::DimensionKind;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{kind} {id} not found")]
    NotFound { kind: DimensionKind, id: i64 },

    #[error("catalog service unavailable: {0}")]
    Unavailable(String),
}

/// Lookup client for the authoritative catalog service. Single-id fetches
/// cover every kind; the ids variant exists for the brand batch path only.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch the current record for one entity.
    async fn fetch_by_id(&self, kind: DimensionKind, id: i64) -> Result<Value, CatalogError>;

    /// Batched brand lookup. `ids` is the comma-joined id list, insertion
    /// order preserved, duplicates allowed.
    async fn fetch_brands_by_ids(&self, ids: &str) -> Result<Vec<Value>, CatalogError>;
}

pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch_by_id(&self, kind: DimensionKind, id: i64) -> Result<Value, CatalogError> {
        let url = format!("{}/{}/{}", self.base_url, kind, id);
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound { kind, id });
        }

        let record = response.error_for_status()?.json::<Value>().await?;
        Ok(record)
    }

    async fn fetch_brands_by_ids(&self, ids: &str) -> Result<Vec<Value>, CatalogError> {
        let url = format!("{}/brand?ids={}", self.base_url, ids);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let records = response.json::<Vec<Value>>().await?;
        Ok(records)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CatalogCall {
    ById(DimensionKind, i64),
    BrandBatch(String),
}

/// Hand-rolled mock: a record map keyed on (kind, id) plus a call log.
/// Brand batch lookups skip ids without a configured record, which is how
/// tests exercise the partial-result path.
#[derive(Clone, Default)]
pub struct MockCatalogClient {
    records: Arc<Mutex<HashMap<(DimensionKind, i64), Value>>>,
    fail_ids: Arc<Mutex<HashSet<(DimensionKind, i64)>>>,
    fail_batches: Arc<Mutex<bool>>,
    calls: Arc<Mutex<Vec<CatalogCall>>>,
}

impl MockCatalogClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(&self, kind: DimensionKind, id: i64, record: Value) -> Self {
        lock(&self.records).insert((kind, id), record);
        self.clone()
    }

    pub fn fail_id(&self, kind: DimensionKind, id: i64) -> Self {
        lock(&self.fail_ids).insert((kind, id));
        self.clone()
    }

    pub fn fail_batches(&self) -> Self {
        *lock(&self.fail_batches) = true;
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<CatalogCall> {
        lock(&self.calls).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl CatalogClient for MockCatalogClient {
    async fn fetch_by_id(&self, kind: DimensionKind, id: i64) -> Result<Value, CatalogError> {
        lock(&self.calls).push(CatalogCall::ById(kind, id));

        if lock(&self.fail_ids).contains(&(kind, id)) {
            return Err(CatalogError::Unavailable("injected failure".to_string()));
        }

        lock(&self.records)
            .get(&(kind, id))
            .cloned()
            .ok_or(CatalogError::NotFound { kind, id })
    }

    async fn fetch_brands_by_ids(&self, ids: &str) -> Result<Vec<Value>, CatalogError> {
        lock(&self.calls).push(CatalogCall::BrandBatch(ids.to_string()));

        if *lock(&self.fail_batches) {
            return Err(CatalogError::Unavailable("injected failure".to_string()));
        }

        let records = lock(&self.records);
        Ok(ids
            .split(',')
            .filter_map(|raw| raw.parse::<i64>().ok())
            .filter_map(|id| records.get(&(DimensionKind::Brand, id)).cloned())
            .collect())
    }
}
