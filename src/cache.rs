//! Local cache sitting in front of the object store, keyed by decimal chunk
//! id and written through on every store read.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::config::AppConfig;

fn cache_key(chunk_id: u64) -> String {
    format!("chunk:{chunk_id}")
}

#[async_trait::async_trait]
pub trait ChunkCache: Send + Sync {
    async fn get(&self, chunk_id: u64) -> Option<Vec<u8>>;
    async fn set(&self, chunk_id: u64, bytes: Vec<u8>);
    async fn delete(&self, chunk_id: u64);
    async fn exists(&self, chunk_id: u64) -> bool;
    /// Drops every entry this cache holds.
    async fn clear(&self);
    /// Pipelined multi-get; missing entries are simply absent from the map.
    async fn get_many(&self, chunk_ids: &[u64]) -> HashMap<u64, Vec<u8>>;
    /// Pipelined multi-set.
    async fn set_many(&self, entries: Vec<(u64, Vec<u8>)>);
}

/// Redis-backed cache using a connection manager so reconnects are
/// transparent to callers.
pub struct RedisChunkCache {
    connection: redis::aio::ConnectionManager,
    ttl_seconds: u64,
}

impl RedisChunkCache {
    pub async fn connect(redis_url: &str, config: &AppConfig) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_connection_manager().await?;
        Ok(Self {
            connection,
            ttl_seconds: config.cache_ttl_seconds,
        })
    }
}

#[async_trait::async_trait]
impl ChunkCache for RedisChunkCache {
    async fn get(&self, chunk_id: u64) -> Option<Vec<u8>> {
        let mut conn = self.connection.clone();
        match conn.get::<_, Option<Vec<u8>>>(cache_key(chunk_id)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(chunk_id, error = %e, "cache get failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, chunk_id: u64, bytes: Vec<u8>) {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> = conn
            .set_ex(cache_key(chunk_id), bytes, self.ttl_seconds)
            .await;
        if let Err(e) = result {
            warn!(chunk_id, error = %e, "cache set failed");
        }
    }

    async fn delete(&self, chunk_id: u64) {
        let mut conn = self.connection.clone();
        let _: redis::RedisResult<()> = conn.del(cache_key(chunk_id)).await;
    }

    async fn exists(&self, chunk_id: u64) -> bool {
        let mut conn = self.connection.clone();
        conn.exists(cache_key(chunk_id)).await.unwrap_or_else(|e| {
            warn!(chunk_id, error = %e, "cache exists check failed, treating as absent");
            false
        })
    }

    async fn clear(&self) {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(error = %e, "cache clear failed");
        }
    }

    async fn get_many(&self, chunk_ids: &[u64]) -> HashMap<u64, Vec<u8>> {
        if chunk_ids.is_empty() {
            return HashMap::new();
        }
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        for id in chunk_ids {
            pipe.get(cache_key(*id));
        }
        let values: Vec<Option<Vec<u8>>> = match pipe.query_async(&mut conn).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "cache pipeline get_many failed, treating all as misses");
                return HashMap::new();
            }
        };
        chunk_ids
            .iter()
            .zip(values)
            .filter_map(|(id, value)| value.map(|bytes| (*id, bytes)))
            .collect()
    }

    async fn set_many(&self, entries: Vec<(u64, Vec<u8>)>) {
        if entries.is_empty() {
            return;
        }
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        for (id, bytes) in &entries {
            pipe.set_ex(cache_key(*id), bytes.clone(), self.ttl_seconds)
                .ignore();
        }
        if let Err(e) = pipe.query_async::<()>(&mut conn).await {
            warn!(error = %e, "cache pipeline set_many failed");
        }
    }
}

struct Entry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// Deterministic in-process fake with a real TTL, used by tests and the demo
/// CLI.
pub struct InMemoryChunkCache {
    entries: DashMap<u64, Entry>,
    ttl: Duration,
}

impl InMemoryChunkCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn is_live(entry: &Entry) -> bool {
        Instant::now() < entry.expires_at
    }
}

#[async_trait::async_trait]
impl ChunkCache for InMemoryChunkCache {
    async fn get(&self, chunk_id: u64) -> Option<Vec<u8>> {
        match self.entries.get(&chunk_id) {
            Some(entry) if Self::is_live(&entry) => {
                debug!(chunk_id, "cache_hit");
                Some(entry.bytes.clone())
            }
            Some(_) => {
                debug!(chunk_id, "cache_miss (expired)");
                None
            }
            None => {
                debug!(chunk_id, "cache_miss");
                None
            }
        }
    }

    async fn set(&self, chunk_id: u64, bytes: Vec<u8>) {
        self.entries.insert(
            chunk_id,
            Entry {
                bytes,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    async fn delete(&self, chunk_id: u64) {
        self.entries.remove(&chunk_id);
    }

    async fn exists(&self, chunk_id: u64) -> bool {
        self.entries
            .get(&chunk_id)
            .map(|entry| Self::is_live(&entry))
            .unwrap_or(false)
    }

    async fn clear(&self) {
        self.entries.clear();
    }

    async fn get_many(&self, chunk_ids: &[u64]) -> HashMap<u64, Vec<u8>> {
        let mut out = HashMap::new();
        for id in chunk_ids {
            if let Some(bytes) = self.get(*id).await {
                out.insert(*id, bytes);
            }
        }
        out
    }

    async fn set_many(&self, entries: Vec<(u64, Vec<u8>)>) {
        for (id, bytes) in entries {
            self.set(id, bytes).await;
        }
    }
}
