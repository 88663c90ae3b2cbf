use crate::models::{Link, NewLink, OwnerStats, OwnerSummary, StoreTotals, VisitEvent};
use crate::storage::trait_def::group_by_code;
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                short_code TEXT PRIMARY KEY,
                original_url TEXT NOT NULL,
                owner_id TEXT,
                created_at BIGINT NOT NULL,
                expires_at BIGINT,
                visit_count BIGINT NOT NULL DEFAULT 0,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                deactivated_at BIGINT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_owner ON links(owner_id, created_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_expires ON links(expires_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visits (
                id BIGSERIAL PRIMARY KEY,
                short_code TEXT NOT NULL REFERENCES links(short_code) ON DELETE CASCADE,
                visited_at BIGINT NOT NULL,
                referer TEXT,
                user_agent TEXT NOT NULL,
                ip_hash TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_visits_code_time ON visits(short_code, visited_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_link(&self, link: &NewLink) -> StorageResult<Link> {
        let row = sqlx::query_as::<_, Link>(
            r#"
            INSERT INTO links (short_code, original_url, owner_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (short_code) DO NOTHING
            RETURNING short_code, original_url, owner_id, created_at, expires_at, visit_count, is_active, deactivated_at
            "#,
        )
        .bind(&link.short_code)
        .bind(&link.original_url)
        .bind(&link.owner_id)
        .bind(link.created_at)
        .bind(link.expires_at)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        row.ok_or(StorageError::Conflict)
    }

    async fn get(&self, short_code: &str) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(
            r#"
            SELECT short_code, original_url, owner_id, created_at, expires_at, visit_count, is_active, deactivated_at
            FROM links
            WHERE short_code = $1
            "#,
        )
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn delete(&self, short_code: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM links WHERE short_code = $1")
            .bind(short_code)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_owner(&self, owner_id: &str, limit: i64, offset: i64) -> Result<Vec<Link>> {
        let links = sqlx::query_as::<_, Link>(
            r#"
            SELECT short_code, original_url, owner_id, created_at, expires_at, visit_count, is_active, deactivated_at
            FROM links
            WHERE owner_id = $1
            ORDER BY created_at DESC, short_code ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(links)
    }

    async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Link>> {
        let links = sqlx::query_as::<_, Link>(
            r#"
            SELECT short_code, original_url, owner_id, created_at, expires_at, visit_count, is_active, deactivated_at
            FROM links
            ORDER BY created_at DESC, short_code ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(links)
    }

    async fn record_visits(&self, events: &[VisitEvent]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut stored = 0u64;

        for (short_code, batch) in group_by_code(events) {
            // Row lock taken here serialises with a concurrent delete
            let updated = sqlx::query(
                "UPDATE links SET visit_count = visit_count + $1 WHERE short_code = $2",
            )
            .bind(batch.len() as i64)
            .bind(short_code)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                continue;
            }

            for event in batch {
                sqlx::query(
                    r#"
                    INSERT INTO visits (short_code, visited_at, referer, user_agent, ip_hash)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(&event.short_code)
                .bind(event.timestamp)
                .bind(&event.referer)
                .bind(&event.user_agent)
                .bind(&event.ip_hash)
                .execute(&mut *tx)
                .await?;
                stored += 1;
            }
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn visits(
        &self,
        short_code: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<VisitEvent>> {
        let events = sqlx::query_as::<_, VisitEvent>(
            r#"
            SELECT short_code, visited_at, referer, user_agent, ip_hash
            FROM visits
            WHERE short_code = $1
              AND visited_at >= COALESCE($2, visited_at)
              AND visited_at < COALESCE($3, visited_at + 1)
            ORDER BY visited_at ASC, id ASC
            "#,
        )
        .bind(short_code)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(events)
    }

    async fn owner_visit_times(&self, owner_id: &str, since: i64) -> Result<Vec<i64>> {
        let times = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT v.visited_at
            FROM visits v
            INNER JOIN links l ON l.short_code = v.short_code
            WHERE l.owner_id = $1 AND v.visited_at >= $2
            ORDER BY v.visited_at ASC
            "#,
        )
        .bind(owner_id)
        .bind(since)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(times)
    }

    async fn expire_batch(&self, now: i64, limit: i64) -> Result<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE links
            SET is_active = FALSE, deactivated_at = $1
            WHERE short_code IN (
                SELECT short_code FROM links
                WHERE is_active AND expires_at IS NOT NULL AND expires_at <= $1
                ORDER BY expires_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING short_code
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(codes)
    }

    async fn purge_expired_batch(&self, now: i64, limit: i64) -> Result<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>(
            r#"
            DELETE FROM links
            WHERE short_code IN (
                SELECT short_code FROM links
                WHERE expires_at IS NOT NULL AND expires_at <= $1
                ORDER BY expires_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING short_code
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(codes)
    }

    async fn purge_inactive_batch(&self, before: i64, limit: i64) -> Result<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>(
            r#"
            DELETE FROM links
            WHERE short_code IN (
                SELECT short_code FROM links
                WHERE NOT is_active AND deactivated_at IS NOT NULL AND deactivated_at < $1
                ORDER BY deactivated_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING short_code
            "#,
        )
        .bind(before)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(codes)
    }

    async fn owner_summaries(&self) -> Result<Vec<OwnerSummary>> {
        let owners = sqlx::query_as::<_, OwnerSummary>(
            r#"
            SELECT owner_id AS account_id,
                   COUNT(*) AS links_count,
                   CAST(COALESCE(SUM(visit_count), 0) AS BIGINT) AS total_visits
            FROM links
            WHERE owner_id IS NOT NULL
            GROUP BY owner_id
            ORDER BY owner_id ASC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(owners)
    }

    async fn owner_stats(&self, owner_id: &str, now: i64) -> Result<OwnerStats> {
        let (total_links, total_visits, active_links) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT COUNT(*),
                   CAST(COALESCE(SUM(visit_count), 0) AS BIGINT),
                   CAST(COUNT(*) FILTER (WHERE is_active AND (expires_at IS NULL OR expires_at > $1)) AS BIGINT)
            FROM links
            WHERE owner_id = $2
            "#,
        )
        .bind(now)
        .bind(owner_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(OwnerStats {
            total_links,
            total_visits,
            active_links,
        })
    }

    async fn totals(&self, now: i64) -> Result<StoreTotals> {
        let (total_users, total_links, expired_links, total_visits) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT COUNT(DISTINCT owner_id),
                       COUNT(*),
                       COUNT(*) FILTER (WHERE NOT is_active OR (expires_at IS NOT NULL AND expires_at <= $1)),
                       CAST(COALESCE(SUM(visit_count), 0) AS BIGINT)
                FROM links
                "#,
            )
            .bind(now)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(StoreTotals {
            total_users,
            total_links,
            expired_links,
            total_visits,
        })
    }
}
