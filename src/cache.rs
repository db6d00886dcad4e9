//! Cache Abstraction
//! TTL'd key -> bytes over a pluggable store (Redis in production, an
//! in-process map otherwise). Cache failure is always just a miss.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Absence is normal: expired, evicted, or never set.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
}

/// Redis-backed store over a multiplexed connection manager.
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        info!("🗄️  Redis cache connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("cache get failed (treated as miss): {e}");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
        {
            warn!("cache set failed (ignored): {e}");
        }
    }
}

/// In-process fallback store with lazy expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }
}

/// JSON serialization layer over a byte store, plus memoization key building.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::default()))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key).await?;
        match serde_json::from_slice(&raw) {
            Ok(value) => {
                debug!("cache hit: {key}");
                Some(value)
            }
            Err(e) => {
                warn!("cache entry for {key} undecodable, dropping: {e}");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_vec(value) {
            Ok(raw) => self.store.set(key, raw, ttl).await,
            Err(e) => warn!("cache serialize failed for {key}: {e}"),
        }
    }

    /// Memoization key: `cache:{function}:{8-hex digest of args}`.
    pub fn memo_key<A: Serialize>(function: &str, args: &A) -> String {
        let raw = serde_json::to_vec(args).unwrap_or_default();
        let digest = Sha256::digest(&raw);
        format!("cache:{function}:{}", &hex::encode(digest)[..8])
    }
}

/// Cache key for the N-day volume forecast.
pub fn volume_forecast_key(days: usize) -> String {
    format!("volume_forecast:{days}_days")
}

/// TTL for cached volume forecasts.
pub const FORECAST_TTL: Duration = Duration::from_secs(86_400);
