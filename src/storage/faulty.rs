//! Storage wrapper that injects latency and write failures, for tests

use crate::models::{Link, NewLink, OwnerStats, OwnerSummary, StoreTotals, VisitEvent};
use crate::storage::{SqliteStorage, Storage, StorageResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct FaultyStorage {
    inner: Arc<dyn Storage>,
    /// Sleep after `get` has read its row
    get_delay: Duration,
    /// Sleep before `visits` reads
    visits_delay: Duration,
    /// Sleep before `record_visits` writes
    write_delay: Duration,
    /// Number of upcoming `record_visits` calls that fail
    failing_writes: AtomicUsize,
}

impl FaultyStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            get_delay: Duration::ZERO,
            visits_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
            failing_writes: AtomicUsize::new(0),
        }
    }

    /// Faulty wrapper over a fresh in-memory SQLite store
    pub async fn in_memory() -> Self {
        let inner = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        inner.init().await.unwrap();
        Self::new(Arc::new(inner))
    }

    pub fn slow_get(mut self, delay: Duration) -> Self {
        self.get_delay = delay;
        self
    }

    pub fn slow_visits(mut self, delay: Duration) -> Self {
        self.visits_delay = delay;
        self
    }

    pub fn slow_writes(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn fail_writes(self, count: usize) -> Self {
        self.failing_writes.store(count, Ordering::SeqCst);
        self
    }

    fn take_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Storage for FaultyStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn insert_link(&self, link: &NewLink) -> StorageResult<Link> {
        self.inner.insert_link(link).await
    }

    async fn get(&self, short_code: &str) -> Result<Option<Link>> {
        let link = self.inner.get(short_code).await?;
        if !self.get_delay.is_zero() {
            tokio::time::sleep(self.get_delay).await;
        }
        Ok(link)
    }

    async fn delete(&self, short_code: &str) -> Result<bool> {
        self.inner.delete(short_code).await
    }

    async fn list_by_owner(&self, owner_id: &str, limit: i64, offset: i64) -> Result<Vec<Link>> {
        self.inner.list_by_owner(owner_id, limit, offset).await
    }

    async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Link>> {
        self.inner.list_all(limit, offset).await
    }

    async fn record_visits(&self, events: &[VisitEvent]) -> Result<u64> {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        if self.take_failure() {
            return Err(anyhow!("injected write failure"));
        }
        self.inner.record_visits(events).await
    }

    async fn visits(
        &self,
        short_code: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<VisitEvent>> {
        if !self.visits_delay.is_zero() {
            tokio::time::sleep(self.visits_delay).await;
        }
        self.inner.visits(short_code, from, to).await
    }

    async fn owner_visit_times(&self, owner_id: &str, since: i64) -> Result<Vec<i64>> {
        if !self.visits_delay.is_zero() {
            tokio::time::sleep(self.visits_delay).await;
        }
        self.inner.owner_visit_times(owner_id, since).await
    }

    async fn expire_batch(&self, now: i64, limit: i64) -> Result<Vec<String>> {
        self.inner.expire_batch(now, limit).await
    }

    async fn purge_expired_batch(&self, now: i64, limit: i64) -> Result<Vec<String>> {
        self.inner.purge_expired_batch(now, limit).await
    }

    async fn purge_inactive_batch(&self, before: i64, limit: i64) -> Result<Vec<String>> {
        self.inner.purge_inactive_batch(before, limit).await
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
