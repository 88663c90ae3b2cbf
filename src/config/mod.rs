use anyhow::{bail, Context};
use axum::http::StatusCode;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    /// Public base used to build `short_url` in create responses
    pub base_url: String,
    pub auth: AuthConfig,
    pub codes: CodeConfig,
    pub cache: CacheConfig,
    pub visits: VisitConfig,
    pub analytics: AnalyticsConfig,
    pub sweeper: SweeperConfig,
    /// Expiration applied when a create request leaves `expires_in` empty
    pub default_expires_in: String,
    pub redirect_status: RedirectMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    None,
    Jwt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    #[serde(skip_serializing)]
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeConfig {
    /// Starting length for generated codes
    pub length: usize,
    /// Upper bound the generator may escalate to under collision pressure
    pub max_length: usize,
    /// Insert attempts per generation before giving up
    pub max_attempts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    #[serde(skip_serializing)]
    pub ip_hash_salt: String,
    pub trusted_proxy_mode: TrustedProxyMode,
    /// Proxy networks skipped when walking `X-Forwarded-For` right to left
    #[serde(skip)]
    pub trusted_proxies: Vec<IpNet>,
    pub num_trusted_proxies: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    None,
    Standard,
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub top_n: usize,
    pub query_timeout_ms: u64,
    /// Offset of the reporting timezone used for daily buckets
    pub report_utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Mark expired links inactive and purge them later
    Soft,
    /// Delete expired links and their visits right away
    Hard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    pub policy: RetentionPolicy,
    pub interval_secs: u64,
    pub batch_size: i64,
    pub purge_after_secs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    #[default]
    Found,
    Temporary,
    Permanent,
}

impl RedirectMode {
    pub fn status_code(self) -> StatusCode {
        match self {
            RedirectMode::Found => StatusCode::FOUND,
            RedirectMode::Temporary => StatusCode::TEMPORARY_REDIRECT,
            RedirectMode::Permanent => StatusCode::PERMANENT_REDIRECT,
        }
    }
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            length: 6,
            max_length: 8,
            max_attempts: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_secs: 60,
        }
    }
}

impl Default for VisitConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            flush_interval_ms: 1000,
            ip_hash_salt: "snip-default-salt".to_string(),
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            query_timeout_ms: 5000,
            report_utc_offset_minutes: 0,
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            policy: RetentionPolicy::Soft,
            interval_secs: 300,
            batch_size: 500,
            purge_after_secs: 30 * 24 * 3600,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        _ => Ok(default),
    }
}

/// Comma-separated CIDRs; a bare address is taken as a single-host network.
fn parse_trusted_proxies(raw: &str) -> anyhow::Result<Vec<IpNet>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNet>()
                .ok()
                .or_else(|| {
                    let addr = s.parse::<std::net::IpAddr>().ok()?;
                    let prefix = if addr.is_ipv4() { 32 } else { 128 };
                    IpNet::new(addr, prefix).ok()
                })
                .with_context(|| format!("invalid TRUSTED_PROXIES entry '{s}'"))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./snip.db".to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_or("PORT", 8080u16)?;
        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| format!("http://{host}:{port}"));

        let auth_mode = match std::env::var("AUTH_MODE")
            .unwrap_or_else(|_| "jwt".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => AuthMode::None,
            "jwt" => AuthMode::Jwt,
            other => {
                tracing::warn!(
                    "Unknown AUTH_MODE '{other}', falling back to 'jwt'. Supported values: none, jwt"
                );
                AuthMode::Jwt
            }
        };

        let jwt_secret = match auth_mode {
            AuthMode::Jwt => Some(
                std::env::var("JWT_SECRET").context("JWT_SECRET must be set when AUTH_MODE=jwt")?,
            ),
            AuthMode::None => std::env::var("JWT_SECRET").ok(),
        };

        let code_defaults = CodeConfig::default();
        let codes = CodeConfig {
            length: env_or("CODE_LENGTH", code_defaults.length)?,
            max_length: env_or("CODE_MAX_LENGTH", code_defaults.max_length)?,
            max_attempts: env_or("CODE_MAX_ATTEMPTS", code_defaults.max_attempts)?,
        };

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            max_entries: env_or("CACHE_MAX_ENTRIES", cache_defaults.max_entries)?,
            ttl_secs: env_or("CACHE_TTL_SECS", cache_defaults.ttl_secs)?,
        };

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            _ => TrustedProxyMode::None,
        };

        let visit_defaults = VisitConfig::default();
        let ip_hash_salt = match std::env::var("IP_HASH_SALT") {
            Ok(salt) if !salt.is_empty() => salt,
            _ => {
                tracing::warn!("IP_HASH_SALT not set, visitor hashes use the built-in salt");
                visit_defaults.ip_hash_salt.clone()
            }
        };
        let visits = VisitConfig {
            queue_capacity: env_or("VISIT_QUEUE_CAPACITY", visit_defaults.queue_capacity)?,
            batch_size: env_or("VISIT_BATCH_SIZE", visit_defaults.batch_size)?,
            flush_interval_ms: env_or("VISIT_FLUSH_INTERVAL_MS", visit_defaults.flush_interval_ms)?,
            ip_hash_salt,
            trusted_proxy_mode,
            trusted_proxies: parse_trusted_proxies(
                &std::env::var("TRUSTED_PROXIES").unwrap_or_default(),
            )?,
            num_trusted_proxies: std::env::var("NUM_TRUSTED_PROXIES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok()),
        };

        let analytics_defaults = AnalyticsConfig::default();
        let analytics = AnalyticsConfig {
            top_n: env_or("ANALYTICS_TOP_N", analytics_defaults.top_n)?,
            query_timeout_ms: env_or(
                "ANALYTICS_QUERY_TIMEOUT_MS",
                analytics_defaults.query_timeout_ms,
            )?,
            report_utc_offset_minutes: env_or(
                "REPORT_UTC_OFFSET_MINUTES",
                analytics_defaults.report_utc_offset_minutes,
            )?,
        };

        let sweeper_defaults = SweeperConfig::default();
        let policy = match std::env::var("RETENTION_POLICY")
            .unwrap_or_else(|_| "soft".to_string())
            .to_lowercase()
            .as_str()
        {
            "hard" => RetentionPolicy::Hard,
            _ => RetentionPolicy::Soft,
        };
        let sweeper = SweeperConfig {
            policy,
            interval_secs: env_or("SWEEPER_INTERVAL_SECS", sweeper_defaults.interval_secs)?,
            batch_size: env_or("SWEEPER_BATCH_SIZE", sweeper_defaults.batch_size)?,
            purge_after_secs: env_or("SWEEPER_PURGE_AFTER_SECS", sweeper_defaults.purge_after_secs)?,
        };

        let redirect_status = match std::env::var("REDIRECT_STATUS")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "307" | "temporary" => RedirectMode::Temporary,
            "308" | "permanent" => RedirectMode::Permanent,
            _ => RedirectMode::Found,
        };

        let config = Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10u32)?,
            },
            server: ServerConfig { host, port },
            base_url,
            auth: AuthConfig {
                mode: auth_mode,
                jwt_secret,
            },
            codes,
            cache,
            visits,
            analytics,
            sweeper,
            default_expires_in: std::env::var("DEFAULT_EXPIRES_IN")
                .unwrap_or_else(|_| "365d".to_string()),
            redirect_status,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.codes.length < 6 || self.codes.max_length > 8 {
            bail!(
                "generated code lengths must stay within 6..=8, got {}..={}",
                self.codes.length,
                self.codes.max_length
            );
        }
        if self.codes.length > self.codes.max_length {
            bail!("CODE_LENGTH must not exceed CODE_MAX_LENGTH");
        }
        if self.codes.max_attempts == 0 {
            bail!("CODE_MAX_ATTEMPTS must be at least 1");
        }
        if self.visits.queue_capacity == 0 || self.visits.batch_size == 0 {
            bail!("VISIT_QUEUE_CAPACITY and VISIT_BATCH_SIZE must be greater than 0");
        }
        if self.visits.flush_interval_ms == 0 {
            bail!("VISIT_FLUSH_INTERVAL_MS must be greater than 0");
        }
        if self.analytics.top_n == 0 {
            bail!("ANALYTICS_TOP_N must be greater than 0");
        }
        if self.analytics.report_utc_offset_minutes.abs() >= 24 * 60 {
            bail!("REPORT_UTC_OFFSET_MINUTES must be within one day");
        }
        if self.sweeper.interval_secs == 0 || self.sweeper.batch_size <= 0 {
            bail!("SWEEPER_INTERVAL_SECS and SWEEPER_BATCH_SIZE must be greater than 0");
        }
        if self.auth.mode == AuthMode::Jwt
            && self.auth.jwt_secret.as_deref().unwrap_or("").is_empty()
        {
            bail!("JWT_SECRET must not be empty when AUTH_MODE=jwt");
        }
        crate::models::ExpiresIn::parse(&self.default_expires_in)
            .map_err(|e| anyhow::anyhow!("invalid DEFAULT_EXPIRES_IN: {e}"))?;
        Ok(())
    }

    /// Configuration suitable for tests and local experiments: in-memory SQLite,
    /// auth disabled, defaults everywhere else.
    pub fn for_testing() -> Self {
        Config {
            database: DatabaseConfig {
                backend: DatabaseBackend::Sqlite,
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            base_url: "http://localhost:8080".to_string(),
            auth: AuthConfig {
                mode: AuthMode::None,
                jwt_secret: None,
            },
            codes: CodeConfig::default(),
            cache: CacheConfig::default(),
            visits: VisitConfig::default(),
            analytics: AnalyticsConfig::default(),
            sweeper: SweeperConfig::default(),
            default_expires_in: "365d".to_string(),
            redirect_status: RedirectMode::default(),
        }
    }
}
