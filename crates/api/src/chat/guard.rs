//! Idempotency guard
//!
//! Two tiers: a bounded in-process TTL cache for near-zero-latency rejection
//! of immediate retries, and the durable `chat_events` unique key, which is
//! the only synchronization point that holds across process instances. The
//! cache is an optimization and never the source of truth.
//!
//! Failure policy is fail-closed: if the durable check errors, the caller
//! gets the error and must skip the turn. The platform redelivers, so a
//! skipped turn is recovered; a duplicated side effect is not.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::sync::Mutex;

/// Outcome of claiming an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// First delivery; the caller proceeds.
    Fresh,
    /// Already processed (or being processed); the caller must not proceed.
    Duplicate,
}

const DEFAULT_TTL: Duration = Duration::from_secs(600);
const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded TTL set of recently seen event ids.
pub(crate) struct DedupCache {
    seen: HashSet<String>,
    order: VecDeque<(Instant, String)>,
    ttl: Duration,
    capacity: usize,
}

impl DedupCache {
    pub(crate) fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            ttl,
            capacity,
        }
    }

    pub(crate) fn contains(&mut self, id: &str, now: Instant) -> bool {
        self.prune(now);
        self.seen.contains(id)
    }

    pub(crate) fn insert(&mut self, id: &str, now: Instant) {
        self.prune(now);
        if self.seen.contains(id) {
            return;
        }
        // Evict oldest entries when full; the durable tier still catches
        // anything evicted early
        while self.seen.len() >= self.capacity {
            match self.order.pop_front() {
                Some((_, evicted)) => {
                    self.seen.remove(&evicted);
                }
                None => break,
            }
        }
        self.seen.insert(id.to_string());
        self.order.push_back((now, id.to_string()));
    }

    fn prune(&mut self, now: Instant) {
        while let Some((inserted, _)) = self.order.front() {
            if now.duration_since(*inserted) < self.ttl {
                break;
            }
            if let Some((_, expired)) = self.order.pop_front() {
                self.seen.remove(&expired);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.seen.len()
    }
}

pub struct IdempotencyGuard {
    pool: PgPool,
    cache: Mutex<DedupCache>,
}

impl IdempotencyGuard {
    pub fn new(pool: PgPool) -> Self {
        Self::with_cache(pool, DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    pub fn with_cache(pool: PgPool, ttl: Duration, capacity: usize) -> Self {
        Self {
            pool,
            cache: Mutex::new(DedupCache::new(ttl, capacity)),
        }
    }

    /// Claim an event id for processing.
    ///
    /// Concurrent deliveries of the same id race the durable insert; the
    /// loser observes zero rows affected and reports `Duplicate`, never an
    /// error.
    pub async fn claim(&self, event_id: &str) -> Result<Claim, sqlx::Error> {
        let now = Instant::now();

        {
            let mut cache = self.cache.lock().await;
            if cache.contains(event_id, now) {
                return Ok(Claim::Duplicate);
            }
        }

        let inserted = sqlx::query(
            "INSERT INTO chat_events (event_id) VALUES ($1) ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        // Mark tier 1 either way: a lost race means some instance owns it
        self.cache.lock().await.insert(event_id, now);

        Ok(if inserted {
            Claim::Fresh
        } else {
            Claim::Duplicate
        })
    }
}
