//! Input validation shared by the API layer and the admin CLI

use thiserror::Error;
use url::Url;

const MAX_URL_LEN: usize = 2048;
const MAX_EXPIRATION_SECS: i64 = 10 * 365 * 24 * 3600;
const RESERVED_CODES: &[&str] = &["api", "health", "static", "admin", "dashboard"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidInput {
    #[error("URL cannot be empty")]
    EmptyUrl,
    #[error("URL is longer than {MAX_URL_LEN} bytes")]
    UrlTooLong,
    #[error("URL is not a valid absolute URL")]
    MalformedUrl,
    #[error("URL scheme must be http or https")]
    UnsupportedScheme,
    #[error("expiration '{0}' is not recognised (examples: 1h, 24h, 7d, never)")]
    BadExpiration(String),
    #[error("custom code must be 3-32 characters of letters, digits, '-' or '_'")]
    BadCustomCode,
    #[error("custom code '{0}' is reserved")]
    ReservedCode(String),
}

/// Parsed `expires_in` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiresIn {
    Never,
    After { secs: i64 },
}

impl ExpiresIn {
    /// Accepts `never` or a positive integer followed by one unit of
    /// `m` (minutes), `h`, `d` or `w`.
    pub fn parse(raw: &str) -> Result<Self, InvalidInput> {
        let value = raw.trim().to_ascii_lowercase();
        if value == "never" {
            return Ok(ExpiresIn::Never);
        }

        let bad = || InvalidInput::BadExpiration(raw.to_string());
        let unit = value.chars().last().ok_or_else(bad)?;
        let multiplier = match unit {
            'm' => 60,
            'h' => 3600,
            'd' => 24 * 3600,
            'w' => 7 * 24 * 3600,
            _ => return Err(bad()),
        };

        let amount: i64 = value[..value.len() - 1].parse().map_err(|_| bad())?;
        if amount <= 0 {
            return Err(bad());
        }

        let secs = amount.checked_mul(multiplier).ok_or_else(bad)?;
        if secs > MAX_EXPIRATION_SECS {
            return Err(bad());
        }
        Ok(ExpiresIn::After { secs })
    }

    pub fn expires_at(self, now: i64) -> Option<i64> {
        match self {
            ExpiresIn::Never => None,
            ExpiresIn::After { secs } => Some(now + secs),
        }
    }
}

pub fn validate_url(raw: &str) -> Result<String, InvalidInput> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InvalidInput::EmptyUrl);
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(InvalidInput::UrlTooLong);
    }

    let parsed = Url::parse(trimmed).map_err(|_| InvalidInput::MalformedUrl)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(InvalidInput::UnsupportedScheme);
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(InvalidInput::MalformedUrl);
    }

    // Serialised form is ASCII-only, so it is always a valid Location header
    Ok(parsed.into())
}

pub fn validate_custom_code(code: &str) -> Result<(), InvalidInput> {
    let valid_chars = code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !(3..=32).contains(&code.len()) || !valid_chars {
        return Err(InvalidInput::BadCustomCode);
    }
    if RESERVED_CODES.contains(&code.to_ascii_lowercase().as_str()) {
        return Err(InvalidInput::ReservedCode(code.to_string()));
    }
    Ok(())
}
