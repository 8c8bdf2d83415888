//! Header dictionary (C4): content-addressed header rows with an in-memory
//! LRU/TTL front end over the durable store.
//!
//! Inserts are racy but safe — two ingest tasks computing the same
//! `header_id` concurrently both resolve to the same row because the row is
//! keyed by content hash, not an identity column.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use sqlx::PgPool;
use traffic_analyzer_core::headers::header_id;

const CACHE_CAPACITY: usize = 300;
const CACHE_TTL: Duration = Duration::from_secs(15 * 60);

struct CacheEntry {
    header_id: String,
    inserted_at: Instant,
}

pub struct HeaderDictionary {
    pool: PgPool,
    cache: Mutex<LruCache<(String, String), CacheEntry>>,
}

impl HeaderDictionary {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).unwrap())),
        }
    }

    /// Resolves a header's id, checking the LRU cache, then the store, then
    /// inserting. Returns the same id for equal `(name, value)` input every
    /// time.
    pub async fn get_or_create(&self, name: &str, value: &str) -> Result<String, sqlx::Error> {
        let key = (name.to_string(), value.to_string());
        if let Some(id) = self.cached(&key) {
            return Ok(id);
        }

        let id = header_id(name, value);
        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM http_header WHERE id = $1")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_none() {
            sqlx::query("INSERT INTO http_header (id, name, value) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING")
                .bind(&id)
                .bind(name)
                .bind(value)
                .execute(&self.pool)
                .await?;
        }

        self.cache.lock().unwrap().put(key, CacheEntry { header_id: id.clone(), inserted_at: Instant::now() });
        Ok(id)
    }

    fn cached(&self, key: &(String, String)) -> Option<String> {
        let mut cache = self.cache.lock().unwrap();
        let entry = cache.get(key)?;
        if entry.inserted_at.elapsed() < CACHE_TTL {
            Some(entry.header_id.clone())
        } else {
            cache.pop(key);
            None
        }
    }

    /// Snapshot of the in-memory cache's occupancy, for the non-production
    /// debug introspection route.
    pub fn stats(&self) -> HeaderCacheStats {
        let cache = self.cache.lock().unwrap();
        HeaderCacheStats { len: cache.len(), capacity: CACHE_CAPACITY, ttl_secs: CACHE_TTL.as_secs() }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HeaderCacheStats {
    pub len: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
}
