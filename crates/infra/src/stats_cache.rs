//! C3: short-TTL stats cache (spec §3 StatsEntry, §4.6 step 6, §4.7).

use std::time::Duration;

use ratings_content::ContentId;
use serde::{Deserialize, Serialize};

/// Cached aggregate snapshot for one content item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsEntry {
    pub average_rating: f64,
    pub rating_count: i64,
}

/// Default TTL per spec §6 ("Cache store keyed ... with 3600 s TTL").
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// C3 — Stats Cache.
///
/// Written only by the aggregation worker's invalidation step; readers
/// tolerate misses by falling back to C2 (spec §5 "Shared-resource policy").
pub trait StatsCache: Send + Sync {
    fn get(&self, content_id: ContentId) -> Option<StatsEntry>;
    fn set(&self, content_id: ContentId, entry: StatsEntry, ttl: Duration);
    fn invalidate(&self, content_id: ContentId);
}

fn cache_key(content_id: ContentId) -> String {
    format!("content_rating_stats_{}", content_id.0)
}

/// In-process cache backend (moka), suitable for a single-instance
/// deployment or as the default when no `REDIS_URL` is configured.
pub struct MokaStatsCache {
    inner: moka::sync::Cache<String, StatsEntry>,
}

impl MokaStatsCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: moka::sync::Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(DEFAULT_TTL)
                .build(),
        }
    }
}

impl Default for MokaStatsCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl StatsCache for MokaStatsCache {
    fn get(&self, content_id: ContentId) -> Option<StatsEntry> {
        self.inner.get(&cache_key(content_id))
    }

    fn set(&self, content_id: ContentId, entry: StatsEntry, _ttl: Duration) {
        // moka's per-cache TTL is fixed at construction (DEFAULT_TTL); a
        // per-entry override would need `Expiry`, which this cache doesn't
        // need since the spec's TTL is a single constant (3600s).
        self.inner.insert(cache_key(content_id), entry);
    }

    fn invalidate(&self, content_id: ContentId) {
        self.inner.invalidate(&cache_key(content_id));
    }
}

/// Redis-backed cache backend — shares state across instances of the Query
/// Service, at the cost of a network round-trip per lookup.
pub struct RedisStatsCache {
    client: redis::Client,
}

impl RedisStatsCache {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(redis_url.as_ref())?,
        })
    }
}

impl StatsCache for RedisStatsCache {
    fn get(&self, content_id: ContentId) -> Option<StatsEntry> {
        let mut conn = self.client.get_connection().ok()?;
        let raw: Option<String> = redis::cmd("GET").arg(cache_key(content_id)).query(&mut conn).ok()?;
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    fn set(&self, content_id: ContentId, entry: StatsEntry, ttl: Duration) {
        let Ok(mut conn) = self.client.get_connection() else {
            return;
        };
        let Ok(payload) = serde_json::to_string(&entry) else {
            return;
        };
        let _: Result<(), _> = redis::cmd("SET")
            .arg(cache_key(content_id))
            .arg(payload)
            .arg("EX")
            .arg(ttl.as_secs())
            .query(&mut conn);
    }

    fn invalidate(&self, content_id: ContentId) {
        let Ok(mut conn) = self.client.get_connection() else {
            return;
        };
        let _: Result<(), _> = redis::cmd("DEL").arg(cache_key(content_id)).query(&mut conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moka_cache_roundtrips_and_invalidates() {
        let cache = MokaStatsCache::default();
        let id = ContentId(1);
        assert!(cache.get(id).is_none());

        cache.set(
            id,
            StatsEntry {
                average_rating: 4.0,
                rating_count: 1,
            },
            DEFAULT_TTL,
        );
        assert_eq!(
            cache.get(id),
            Some(StatsEntry {
                average_rating: 4.0,
                rating_count: 1,
            })
        );

        cache.invalidate(id);
        assert!(cache.get(id).is_none());
    }

    #[test]
    fn cache_key_matches_spec_format() {
        assert_eq!(cache_key(ContentId(42)), "content_rating_stats_42");
    }
}
