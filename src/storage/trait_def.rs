use crate::models::{Link, NewLink, OwnerStats, OwnerSummary, StoreTotals, VisitEvent};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short code already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Insert a link if its code is free.
    ///
    /// Uniqueness is decided by the database constraint, so two concurrent
    /// inserts of the same code can never both succeed.
    async fn insert_link(&self, link: &NewLink) -> StorageResult<Link>;

    /// Raw lookup, including expired and soft-expired rows
    async fn get(&self, short_code: &str) -> Result<Option<Link>>;

    /// Hard delete a link together with its visit events
    async fn delete(&self, short_code: &str) -> Result<bool>;

    /// Links created by `owner_id`, newest first
    async fn list_by_owner(&self, owner_id: &str, limit: i64, offset: i64) -> Result<Vec<Link>>;

    /// All links, newest first
    async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Link>>;

    /// Append visit events and bump each link's `visit_count` by the number
    /// of events appended for it, in one transaction. Events for codes that
    /// no longer exist are skipped. Returns how many events were stored.
    async fn record_visits(&self, events: &[VisitEvent]) -> Result<u64>;

    /// Visit events for a code in `[from, to)`, oldest first
    async fn visits(
        &self,
        short_code: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<VisitEvent>>;

    /// Timestamps of every visit to any link owned by `owner_id` since `since`
    async fn owner_visit_times(&self, owner_id: &str, since: i64) -> Result<Vec<i64>>;

    /// Mark up to `limit` active links with `expires_at <= now` inactive.
    /// Returns the affected codes.
    async fn expire_batch(&self, now: i64, limit: i64) -> Result<Vec<String>>;

    /// Hard delete up to `limit` links with `expires_at <= now`
    async fn purge_expired_batch(&self, now: i64, limit: i64) -> Result<Vec<String>>;

    /// Hard delete up to `limit` soft-expired links deactivated before `before`
    async fn purge_inactive_batch(&self, before: i64, limit: i64) -> Result<Vec<String>>;

    /// Per-account link and visit totals
    async fn owner_summaries(&self) -> Result<Vec<OwnerSummary>>;

    /// Link counters for a single account
    async fn owner_stats(&self, owner_id: &str, now: i64) -> Result<OwnerStats>;

    /// Store-wide counters for the admin overview
    async fn totals(&self, now: i64) -> Result<StoreTotals>;
}

/// Groups events by code, preserving first-seen order of codes.
pub(crate) fn group_by_code(events: &[VisitEvent]) -> Vec<(&str, Vec<&VisitEvent>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&VisitEvent>)> = Vec::new();
    for event in events {
        let code = event.short_code.as_str();
        match index.get(code) {
            Some(&slot) => groups[slot].1.push(event),
            None => {
                index.insert(code, groups.len());
                groups.push((code, vec![event]));
            }
        }
    }
    groups
}
