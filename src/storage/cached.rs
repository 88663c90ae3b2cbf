use crate::models::{Link, NewLink, OwnerStats, OwnerSummary, StoreTotals, VisitEvent};
use crate::storage::{Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache in front of the link lookups on the redirect path.
///
/// Only hits are cached; a miss always goes to the database so a code created
/// by another instance is visible immediately. Expiry is re-checked by the
/// caller on every read, so a cached row can never resolve past `expires_at`.
///
/// Invalidation is local to this process. A delete made through another
/// instance stays invisible here until the entry's TTL (`CACHE_TTL_SECS`)
/// runs out.
pub struct CachedStorage {
    /// Underlying storage implementation
    inner: Arc<dyn Storage>,
    /// Read cache for link lookups
    read_cache: Cache<String, Link>,
    /// Bumped before every invalidation. A lookup only caches its row if no
    /// invalidation happened while it was reading.
    generation: AtomicU64,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, max_cache_entries: u64, ttl_secs: u64) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            inner,
            read_cache,
            generation: AtomicU64::new(0),
        }
    }

    async fn invalidate(&self, short_code: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.read_cache.invalidate(short_code).await;
    }

    async fn invalidate_all_of(&self, codes: &[String]) {
        for code in codes {
            self.invalidate(code).await;
        }
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn insert_link(&self, link: &NewLink) -> StorageResult<Link> {
        let created = self.inner.insert_link(link).await?;

        self.read_cache
            .insert(created.short_code.clone(), created.clone())
            .await;

        Ok(created)
    }

    async fn get(&self, short_code: &str) -> Result<Option<Link>> {
        if let Some(cached) = self.read_cache.get(short_code).await {
            return Ok(Some(cached));
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let result = self.inner.get(short_code).await?;
        if let Some(ref link) = result {
            if self.generation.load(Ordering::SeqCst) == generation {
                self.read_cache
                    .insert(short_code.to_string(), link.clone())
                    .await;

                // An invalidation that slipped in between the check and the
                // insert must still win
                if self.generation.load(Ordering::SeqCst) != generation {
                    self.read_cache.invalidate(short_code).await;
                }
            }
        }

        Ok(result)
    }

    async fn delete(&self, short_code: &str) -> Result<bool> {
        let removed = self.inner.delete(short_code).await?;
        self.invalidate(short_code).await;
        Ok(removed)
    }

    async fn list_by_owner(&self, owner_id: &str, limit: i64, offset: i64) -> Result<Vec<Link>> {
        self.inner.list_by_owner(owner_id, limit, offset).await
    }

    async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Link>> {
        self.inner.list_all(limit, offset).await
    }

    async fn record_visits(&self, events: &[VisitEvent]) -> Result<u64> {
        let stored = self.inner.record_visits(events).await?;

        // Cached rows carry a stale visit_count now
        for event in events {
            self.invalidate(&event.short_code).await;
        }

        Ok(stored)
    }

    async fn visits(
        &self,
        short_code: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<VisitEvent>> {
        self.inner.visits(short_code, from, to).await
    }

    async fn owner_visit_times(&self, owner_id: &str, since: i64) -> Result<Vec<i64>> {
        self.inner.owner_visit_times(owner_id, since).await
    }

    async fn expire_batch(&self, now: i64, limit: i64) -> Result<Vec<String>> {
        let codes = self.inner.expire_batch(now, limit).await?;
        self.invalidate_all_of(&codes).await;
        Ok(codes)
    }

    async fn purge_expired_batch(&self, now: i64, limit: i64) -> Result<Vec<String>> {
        let codes = self.inner.purge_expired_batch(now, limit).await?;
        self.invalidate_all_of(&codes).await;
        Ok(codes)
    }

    async fn purge_inactive_batch(&self, before: i64, limit: i64) -> Result<Vec<String>> {
        let codes = self.inner.purge_inactive_batch(before, limit).await?;
        self.invalidate_all_of(&codes).await;
        Ok(codes)
    }

    async fn owner_summaries(&self) -> Result<Vec<OwnerSummary>> {
        self.inner.owner_summaries().await
    }

    async fn owner_stats(&self, owner_id: &str, now: i64) -> Result<OwnerStats> {
        self.inner.owner_stats(owner_id, now).await
    }

    async fn totals(&self, now: i64) -> Result<StoreTotals> {
        self.inner.totals(now).await
    }
}
