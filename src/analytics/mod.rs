//! Visit statistics computed on read from the visit log

pub mod aggregator;
pub mod models;

pub use aggregator::{summarize, Aggregator};
pub use models::{DailyVisit, RefererCount, StatsSummary, UserAgentCount, VisitRange};
