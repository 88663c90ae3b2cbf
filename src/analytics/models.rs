//! Response shapes for visit statistics

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyVisit {
    /// Calendar day in the reporting offset, `YYYY-MM-DD`
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefererCount {
    pub url: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentCount {
    pub name: String,
    pub count: i64,
}

/// Visit statistics for one short code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_visits: i64,
    pub daily_visits: Vec<DailyVisit>,
    pub top_referers: Vec<RefererCount>,
    pub top_user_agents: Vec<UserAgentCount>,
}

/// Half-open time window `[from, to)` in unix seconds; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct VisitRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}
