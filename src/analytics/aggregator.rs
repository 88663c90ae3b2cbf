//! On-demand aggregation of the visit log
//!
//! Nothing is pre-aggregated: every summary is derived from the stored
//! events, so it reflects whatever the recorder has flushed so far. Storage
//! reads are bounded by the configured query timeout; on expiry the query
//! future is dropped, which cancels it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracing::{debug, warn};

use crate::analytics::models::{DailyVisit, RefererCount, StatsSummary, UserAgentCount, VisitRange};
use crate::config::AnalyticsConfig;
use crate::models::VisitEvent;
use crate::storage::Storage;

const SECONDS_PER_DAY: i64 = 86_400;

pub struct Aggregator {
    storage: Arc<dyn Storage>,
    top_n: usize,
    query_timeout: Duration,
    offset: FixedOffset,
}

impl Aggregator {
    pub fn new(storage: Arc<dyn Storage>, config: &AnalyticsConfig) -> Self {
        let offset = FixedOffset::east_opt(config.report_utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!(
                minutes = config.report_utc_offset_minutes,
                "Reporting offset out of range, using UTC"
            );
            utc()
        });

        Self {
            storage,
            top_n: config.top_n,
            query_timeout: Duration::from_millis(config.query_timeout_ms),
            offset,
        }
    }

    /// Totals, daily buckets and top referers/user agents for one code.
    pub async fn summary(&self, short_code: &str, range: VisitRange) -> Result<StatsSummary> {
        let events = tokio::time::timeout(
            self.query_timeout,
            self.storage.visits(short_code, range.from, range.to),
        )
        .await
        .map_err(|_| anyhow!("visit query for {short_code} exceeded {:?}", self.query_timeout))??;

        debug!(short_code = %short_code, events = events.len(), "Aggregating visits");
        Ok(summarize(&events, self.top_n, self.offset))
    }

    /// Daily visit counts across all links of `owner_id` for the `days`
    /// calendar days ending with the day of `now`. Days without visits are
    /// omitted.
    pub async fn owner_trend(&self, owner_id: &str, days: i64, now: i64) -> Result<Vec<DailyVisit>> {
        let since = trend_start(now, days, self.offset);
        let times = tokio::time::timeout(
            self.query_timeout,
            self.storage.owner_visit_times(owner_id, since),
        )
        .await
        .map_err(|_| anyhow!("trend query exceeded {:?}", self.query_timeout))??;

        Ok(daily_buckets(times.into_iter(), self.offset))
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Midnight, in `offset`, of the first of the `days` calendar days that end
/// with the day containing `now`.
fn trend_start(now: i64, days: i64, offset: FixedOffset) -> i64 {
    let shift = i64::from(offset.local_minus_utc());
    let today = (now + shift).div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY - shift;
    today - (days.max(1) - 1) * SECONDS_PER_DAY
}

/// Pure aggregation over an already-fetched event set.
pub fn summarize(events: &[VisitEvent], top_n: usize, offset: FixedOffset) -> StatsSummary {
    let daily_visits = daily_buckets(events.iter().map(|e| e.timestamp), offset);

    let top_referers = top_values(events.iter().filter_map(|e| e.referer.as_deref()), top_n)
        .into_iter()
        .map(|(url, count)| RefererCount { url, count })
        .collect();

    let top_user_agents = top_values(events.iter().map(|e| e.user_agent.as_str()), top_n)
        .into_iter()
        .map(|(name, count)| UserAgentCount { name, count })
        .collect();

    StatsSummary {
        total_visits: events.len() as i64,
        daily_visits,
        top_referers,
        top_user_agents,
    }
}

/// Bucket timestamps into calendar days of `offset`, ascending.
pub fn daily_buckets(timestamps: impl Iterator<Item = i64>, offset: FixedOffset) -> Vec<DailyVisit> {
    // `YYYY-MM-DD` orders lexicographically the same as chronologically
    let mut days: BTreeMap<String, i64> = BTreeMap::new();
    for ts in timestamps {
        let Some(moment) = DateTime::from_timestamp(ts, 0) else {
            continue;
        };
        let date = moment.with_timezone(&offset).format("%Y-%m-%d").to_string();
        *days.entry(date).or_insert(0) += 1;
    }

    days.into_iter()
        .map(|(date, count)| DailyVisit { date, count })
        .collect()
}

/// The `n` most frequent non-empty values. Equal counts keep first-seen order.
fn top_values<'a>(values: impl Iterator<Item = &'a str>, n: usize) -> Vec<(String, i64)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(&str, i64)> = Vec::new();

    for value in values.filter(|v| !v.is_empty()) {
        match index.get(value) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                index.insert(value, counts.len());
                counts.push((value, 1));
            }
        }
    }

    // Stable sort keeps insertion order among ties
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(n)
        .map(|(value, count)| (value.to_string(), count))
        .collect()
}
