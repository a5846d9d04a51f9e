//! Escalation state store: Redis-backed for scaled deployments, in-memory
//! for single instances and tests.
//!
//! One entry per (patient, metric type) key, stored as JSON with a TTL so
//! stale keys clear themselves when a patient's feed goes quiet. The TTL
//! is refreshed on every write.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::bb8::Pool as RedisPool;
use bb8_redis::redis;
use bb8_redis::RedisConnectionManager;
use vitalflow_core::escalation::EscalationState;
use vitalflow_core::metric::MetricType;
use vitalflow_core::types::DbId;

/// Identity of one escalation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub patient_id: DbId,
    pub metric_type: MetricType,
}

impl StateKey {
    /// Redis key, namespaced so the cache can be shared.
    pub fn cache_key(&self) -> String {
        format!("escalation:{}:{}", self.patient_id, self.metric_type)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("Redis pool error: {0}")]
    Pool(#[from] bb8_redis::bb8::RunError<redis::RedisError>),

    #[error("Redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Stored state is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Store seam for escalation windows.
///
/// `put` must refresh the TTL; `get` after expiry returns `None`, which
/// the engine treats as a fresh key.
#[async_trait]
pub trait EscalationStateStore: Send + Sync {
    async fn get(&self, key: &StateKey) -> Result<Option<EscalationState>, StateStoreError>;
    async fn put(
        &self,
        key: &StateKey,
        state: &EscalationState,
        ttl: Duration,
    ) -> Result<(), StateStoreError>;
    async fn remove(&self, key: &StateKey) -> Result<(), StateStoreError>;
}

// ---------------------------------------------------------------------------
// Redis store
// ---------------------------------------------------------------------------

/// Redis-backed store, shared by horizontally scaled pipeline instances.
pub struct RedisStateStore {
    pool: RedisPool<RedisConnectionManager>,
}

impl RedisStateStore {
    /// Connect a bounded pool to the cache.
    pub async fn connect(cache_url: &str) -> Result<Self, StateStoreError> {
        let manager = RedisConnectionManager::new(cache_url)?;
        let pool = RedisPool::builder().max_size(10).build(manager).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl EscalationStateStore for RedisStateStore {
    async fn get(&self, key: &StateKey) -> Result<Option<EscalationState>, StateStoreError> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(key.cache_key())
            .query_async(&mut *conn)
            .await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &StateKey,
        state: &EscalationState,
        ttl: Duration,
    ) -> Result<(), StateStoreError> {
        let json = serde_json::to_string(state)?;
        // SETEX rejects a zero expiry.
        let ttl_secs = ttl.as_secs().max(1);
        let mut conn = self.pool.get().await?;
        let _: () = redis::cmd("SETEX")
            .arg(key.cache_key())
            .arg(ttl_secs)
            .arg(json)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &StateKey) -> Result<(), StateStoreError> {
        let mut conn = self.pool.get().await?;
        let _: () = redis::cmd("DEL")
            .arg(key.cache_key())
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-process store for single-instance deployments and tests.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<StateKey, (EscalationState, tokio::time::Instant)>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EscalationStateStore for MemoryStateStore {
    async fn get(&self, key: &StateKey) -> Result<Option<EscalationState>, StateStoreError> {
        let mut entries = self.entries.lock().expect("state lock poisoned");
        match entries.get(key) {
            Some((state, expires_at)) if *expires_at > tokio::time::Instant::now() => {
                Ok(Some(state.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &StateKey,
        state: &EscalationState,
        ttl: Duration,
    ) -> Result<(), StateStoreError> {
        let expires_at = tokio::time::Instant::now() + ttl;
        self.entries
            .lock()
            .expect("state lock poisoned")
            .insert(*key, (state.clone(), expires_at));
        Ok(())
    }

    async fn remove(&self, key: &StateKey) -> Result<(), StateStoreError> {
        self.entries
            .lock()
            .expect("state lock poisoned")
            .remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
