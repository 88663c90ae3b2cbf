use anyhow::{anyhow, Context, Result};
use csv::WriterBuilder;
use serde::Serialize;

use crate::analytics::StatsSummary;
use crate::models::{Link, OwnerSummary};

/// Full dump returned by the admin export endpoint.
#[derive(Debug, Serialize)]
pub struct ExportBundle {
    pub users: Vec<OwnerSummary>,
    pub urls: Vec<Link>,
    pub exported_at: i64,
}

#[derive(Serialize)]
struct StatsCsvRow<'a> {
    section: &'a str,
    value: &'a str,
    count: i64,
}

/// Render a summary as one CSV table: `section,value,count`, with sections
/// `daily`, `referer` and `user_agent` in that order.
pub fn stats_csv(summary: &StatsSummary) -> Result<String> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());

    for day in &summary.daily_visits {
        writer.serialize(StatsCsvRow {
            section: "daily",
            value: &day.date,
            count: day.count,
        })?;
    }
    for referer in &summary.top_referers {
        writer.serialize(StatsCsvRow {
            section: "referer",
            value: &referer.url,
            count: referer.count,
        })?;
    }
    for agent in &summary.top_user_agents {
        writer.serialize(StatsCsvRow {
            section: "user_agent",
            value: &agent.name,
            count: agent.count,
        })?;
    }

    // An empty summary still gets its header row
    if summary.daily_visits.is_empty()
        && summary.top_referers.is_empty()
        && summary.top_user_agents.is_empty()
    {
        writer.write_record(["section", "value", "count"])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("failed to flush CSV writer: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}
