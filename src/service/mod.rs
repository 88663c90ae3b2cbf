//! Link lifecycle operations behind the HTTP layer
//!
//! Every operation validates its input and checks the caller's rights before
//! touching the generator or storage. Reads of another account's link fail
//! with [`ServiceError::Forbidden`], which the API renders as a 404.

mod error;
mod export;

pub use error::{ServiceError, ServiceResult};
pub use export::{stats_csv, ExportBundle};

use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::analytics::{Aggregator, DailyVisit, StatsSummary, VisitRange};
use crate::auth::Identity;
use crate::codegen::CodeGenerator;
use crate::config::Config;
use crate::models::{
    validate_custom_code, validate_url, CreateLinkRequest, CreateLinkResponse, ExpiresIn, Link,
    NewLink, OwnerSummary, StoreTotals,
};
use crate::storage::Storage;
use crate::sweeper::{SweepReport, Sweeper};
use crate::visits::VisitRecorder;

/// Number of links shown on the dashboard
const RECENT_LINKS: i64 = 5;
/// Days covered by the dashboard visit trend
const TREND_DAYS: i64 = 7;
const MAX_PAGE_SIZE: i64 = 1000;
const EXPORT_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub total_links: i64,
    pub total_visits: i64,
    pub active_links: i64,
    pub recent_links: Vec<Link>,
    pub visits_trend: Vec<DailyVisit>,
}

pub struct LinkService {
    storage: Arc<dyn Storage>,
    generator: CodeGenerator,
    recorder: Arc<VisitRecorder>,
    aggregator: Aggregator,
    sweeper: Arc<Sweeper>,
    base_url: String,
    default_expires_in: ExpiresIn,
}

impl LinkService {
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        recorder: Arc<VisitRecorder>,
        sweeper: Arc<Sweeper>,
    ) -> ServiceResult<Self> {
        let default_expires_in = ExpiresIn::parse(&config.default_expires_in)?;

        Ok(Self {
            generator: CodeGenerator::new(&config.codes),
            aggregator: Aggregator::new(Arc::clone(&storage), &config.analytics),
            storage,
            recorder,
            sweeper,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_expires_in,
        })
    }

    pub fn short_url(&self, short_code: &str) -> String {
        format!("{}/{}", self.base_url, short_code)
    }

    pub async fn create(
        &self,
        request: CreateLinkRequest,
        caller: Option<&Identity>,
    ) -> ServiceResult<CreateLinkResponse> {
        let original_url = validate_url(&request.original_url)?;

        let expires_in = match request.expires_in.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => ExpiresIn::parse(raw)?,
            _ => self.default_expires_in,
        };

        let custom_code = request
            .custom_code
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if let Some(code) = custom_code.as_deref() {
            validate_custom_code(code)?;
        }

        let now = now();
        let draft = NewLink {
            short_code: custom_code.clone().unwrap_or_default(),
            original_url,
            owner_id: caller.map(|c| c.account_id.clone()),
            created_at: now,
            expires_at: expires_in.expires_at(now),
        };

        let link = match custom_code {
            Some(_) => self.generator.claim_custom(self.storage.as_ref(), &draft).await?,
            None => self.generator.create_unique(self.storage.as_ref(), draft).await?,
        };

        info!(
            short_code = %link.short_code,
            owner = link.owner_id.as_deref().unwrap_or("-"),
            "Created short link"
        );

        Ok(CreateLinkResponse {
            short_url: self.short_url(&link.short_code),
            short_code: link.short_code,
            original_url: link.original_url,
            expires_at: link.expires_at,
        })
    }

    /// The live link for a code. Expired and soft-expired links are
    /// `NotFound` whether or not the sweeper has run.
    pub async fn resolve(&self, short_code: &str) -> ServiceResult<Link> {
        match self.storage.get(short_code).await? {
            Some(link) if link.is_live(now()) => Ok(link),
            _ => Err(ServiceError::NotFound),
        }
    }

    /// Hand a visit to the recorder. Never blocks the redirect.
    pub fn record_visit(
        &self,
        short_code: &str,
        referer: Option<String>,
        user_agent: Option<String>,
        client_ip: IpAddr,
    ) {
        self.recorder
            .record(short_code, referer, user_agent, client_ip);
    }

    pub async fn delete(&self, short_code: &str, caller: &Identity) -> ServiceResult<()> {
        let link = self.find(short_code).await?;
        authorize_owner(&link, caller)?;

        if !self.storage.delete(short_code).await? {
            // Raced with another delete or a purge
            return Err(ServiceError::NotFound);
        }

        info!(short_code = %short_code, by = %caller.account_id, "Deleted short link");
        Ok(())
    }

    pub async fn list_owned(
        &self,
        caller: &Identity,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<Vec<Link>> {
        let (limit, offset) = page(limit, offset);
        Ok(self
            .storage
            .list_by_owner(&caller.account_id, limit, offset)
            .await?)
    }

    /// Visit statistics. Anonymous links are public; owned links are visible
    /// to their owner and to admins.
    pub async fn stats(
        &self,
        short_code: &str,
        caller: Option<&Identity>,
        range: VisitRange,
    ) -> ServiceResult<StatsSummary> {
        if let (Some(from), Some(to)) = (range.from, range.to) {
            if from >= to {
                return Err(ServiceError::Validation(
                    "'from' must be earlier than 'to'".to_string(),
                ));
            }
        }

        let link = self.find(short_code).await?;
        if link.owner_id.is_some() {
            match caller {
                Some(identity) => authorize_owner(&link, identity)?,
                None => return Err(ServiceError::Unauthorized),
            }
        }

        Ok(self.aggregator.summary(short_code, range).await?)
    }

    pub async fn export_stats(
        &self,
        short_code: &str,
        caller: Option<&Identity>,
        range: VisitRange,
    ) -> ServiceResult<String> {
        let summary = self.stats(short_code, caller, range).await?;
        Ok(stats_csv(&summary)?)
    }

    pub async fn dashboard(&self, caller: &Identity) -> ServiceResult<Dashboard> {
        let now = now();
        let stats = self.storage.owner_stats(&caller.account_id, now).await?;
        let recent_links = self
            .storage
            .list_by_owner(&caller.account_id, RECENT_LINKS, 0)
            .await?;
        let visits_trend = self
            .aggregator
            .owner_trend(&caller.account_id, TREND_DAYS, now)
            .await?;

        Ok(Dashboard {
            total_links: stats.total_links,
            total_visits: stats.total_visits,
            active_links: stats.active_links,
            recent_links,
            visits_trend,
        })
    }

    /// Run one sweep on demand.
    pub async fn cleanup(&self, caller: &Identity) -> ServiceResult<SweepReport> {
        require_admin(caller)?;
        let report = self.sweeper.sweep().await?;
        info!(by = %caller.account_id, expired = report.expired, purged = report.purged, "Manual cleanup");
        Ok(report)
    }

    pub async fn admin_totals(&self, caller: &Identity) -> ServiceResult<StoreTotals> {
        require_admin(caller)?;
        Ok(self.storage.totals(now()).await?)
    }

    pub async fn admin_users(&self, caller: &Identity) -> ServiceResult<Vec<OwnerSummary>> {
        require_admin(caller)?;
        Ok(self.storage.owner_summaries().await?)
    }

    pub async fn admin_user_links(
        &self,
        caller: &Identity,
        account_id: &str,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<Vec<Link>> {
        require_admin(caller)?;
        let (limit, offset) = page(limit, offset);
        Ok(self.storage.list_by_owner(account_id, limit, offset).await?)
    }

    /// Every account rollup and every link, for offline analysis.
    pub async fn admin_export(&self, caller: &Identity) -> ServiceResult<ExportBundle> {
        require_admin(caller)?;

        let users = self.storage.owner_summaries().await?;
        let mut urls = Vec::new();
        loop {
            let page = self
                .storage
                .list_all(EXPORT_PAGE_SIZE, urls.len() as i64)
                .await?;
            let done = (page.len() as i64) < EXPORT_PAGE_SIZE;
            urls.extend(page);
            if done {
                break;
            }
        }

        Ok(ExportBundle {
            users,
            urls,
            exported_at: now(),
        })
    }

    async fn find(&self, short_code: &str) -> ServiceResult<Link> {
        self.storage
            .get(short_code)
            .await?
            .ok_or(ServiceError::NotFound)
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn page(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_PAGE_SIZE), offset.max(0))
}

fn require_admin(caller: &Identity) -> ServiceResult<()> {
    if caller.is_admin {
        Ok(())
    } else {
        Err(ServiceError::AdminRequired)
    }
}

/// Owners and admins only. Anonymous links have no owner, so only admins pass.
fn authorize_owner(link: &Link, caller: &Identity) -> ServiceResult<()> {
    if caller.is_admin || link.is_owned_by(&caller.account_id) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden)
    }
}
