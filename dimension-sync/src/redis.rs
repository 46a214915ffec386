use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CacheError {
    #[error(transparent)]
    Redis(#[from] Arc<redis::RedisError>),

    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Redis(Arc::new(err))
    }
}

/// A small redis wrapper exposing only the commands this service uses, so
/// tests can observe writes and inject failures.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn set(&self, k: String, v: String) -> Result<(), CacheError>;
    async fn del(&self, k: String) -> Result<(), CacheError>;
}

pub struct RedisCacheClient {
    connection: MultiplexedConnection,
}

impl RedisCacheClient {
    pub async fn new(addr: String) -> Result<Self, CacheError> {
        let client = redis::Client::open(addr)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheClient for RedisCacheClient {
    async fn set(&self, k: String, v: String) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(k, v).await?;
        Ok(())
    }

    async fn del(&self, k: String) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(k).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CacheCall {
    pub op: &'static str,
    pub key: String,
}

/// Hand-rolled mock: an in-memory view of the store plus a call log, with
/// per-key failure injection.
#[derive(Clone, Default)]
pub struct MockCacheClient {
    entries: Arc<Mutex<HashMap<String, String>>>,
    fail_keys: Arc<Mutex<HashMap<String, CacheError>>>,
    calls: Arc<Mutex<Vec<CacheCall>>>,
}

impl MockCacheClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_key(&self, key: &str) -> Self {
        lock(&self.fail_keys).insert(
            key.to_owned(),
            CacheError::Unavailable("injected failure".to_string()),
        );
        self.clone()
    }

    pub fn entry(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn get_calls(&self) -> Vec<CacheCall> {
        lock(&self.calls).clone()
    }

    fn check_failure(&self, key: &str) -> Result<(), CacheError> {
        match lock(&self.fail_keys).get(key) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl CacheClient for MockCacheClient {
    async fn set(&self, k: String, v: String) -> Result<(), CacheError> {
        lock(&self.calls).push(CacheCall {
            op: "set",
            key: k.clone(),
        });
        self.check_failure(&k)?;
        lock(&self.entries).insert(k, v);
        Ok(())
    }

    async fn del(&self, k: String) -> Result<(), CacheError> {
        lock(&self.calls).push(CacheCall {
            op: "del",
            key: k.clone(),
        });
        self.check_failure(&k)?;
        lock(&self.entries).remove(&k);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_writes() {
        let client = MockCacheClient::new();

        client
            .set("brand_1".to_string(), "{}".to_string())
            .await
            .unwrap();
        client.del("brand_2".to_string()).await.unwrap();

        assert_eq!(client.entry("brand_1").as_deref(), Some("{}"));
        assert_eq!(client.entry("brand_2"), None);

        let calls = client.get_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].op, "set");
        assert_eq!(calls[0].key, "brand_1");
        assert_eq!(calls[1].op, "del");
    }

    #[tokio::test]
    async fn test_mock_del_removes_entry() {
        let client = MockCacheClient::new();

        client
            .set("category_7".to_string(), "x".to_string())
            .await
            .unwrap();
        client.del("category_7".to_string()).await.unwrap();

        assert_eq!(client.entry("category_7"), None);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let client = MockCacheClient::new().fail_key("brand_1");

        let err = client
            .set("brand_1".to_string(), "{}".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Unavailable(_)));
        assert_eq!(client.entry("brand_1"), None);
    }
}
