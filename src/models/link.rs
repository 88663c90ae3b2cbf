use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub short_code: String,
    pub original_url: String,
    pub owner_id: Option<String>,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub visit_count: i64,
    pub is_active: bool,
    pub deactivated_at: Option<i64>,
}

impl Link {
    /// A link resolves only while active and strictly before its expiry.
    pub fn is_live(&self, now: i64) -> bool {
        self.is_active && self.expires_at.is_none_or(|exp| now < exp)
    }

    pub fn is_owned_by(&self, account_id: &str) -> bool {
        self.owner_id.as_deref() == Some(account_id)
    }
}

/// Row to insert; `short_code` is either drawn by the generator or user-chosen.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub short_code: String,
    pub original_url: String,
    pub owner_id: Option<String>,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct VisitEvent {
    pub short_code: String,
    #[sqlx(rename = "visited_at")]
    pub timestamp: i64,
    pub referer: Option<String>,
    pub user_agent: String,
    pub ip_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    #[serde(alias = "url")]
    pub original_url: String,
    #[serde(default)]
    pub expires_in: Option<String>,
    #[serde(default)]
    pub custom_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateLinkResponse {
    pub short_code: String,
    pub original_url: String,
    pub short_url: String,
    pub expires_at: Option<i64>,
}

/// Per-account rollup used by the admin user listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OwnerSummary {
    pub account_id: String,
    pub links_count: i64,
    pub total_visits: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnerStats {
    pub total_links: i64,
    pub total_visits: i64,
    pub active_links: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreTotals {
    pub total_users: i64,
    pub total_links: i64,
    pub expired_links: i64,
    pub total_visits: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(expires_at: Option<i64>, is_active: bool) -> Link {
        Link {
            short_code: "abc123".to_string(),
            original_url: "https://example.com".to_string(),
            owner_id: Some("alice".to_string()),
            created_at: 1_000,
            expires_at,
            visit_count: 0,
            is_active,
            deactivated_at: None,
        }
    }

    #[test]
    fn test_is_live_respects_expiry_boundary() {
        assert!(link(None, true).is_live(5_000));
        assert!(link(Some(2_000), true).is_live(1_999));
        assert!(!link(Some(2_000), true).is_live(2_000));
        assert!(!link(None, false).is_live(1_500));
    }

    #[test]
    fn test_ownership() {
        let l = link(None, true);
        assert!(l.is_owned_by("alice"));
        assert!(!l.is_owned_by("bob"));

        let mut anonymous = l.clone();
        anonymous.owner_id = None;
        assert!(!anonymous.is_owned_by("alice"));
    }

    #[test]
    fn test_create_request_accepts_url_alias() {
        let req: CreateLinkRequest =
            serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
        assert_eq!(req.original_url, "https://example.com");
        assert!(req.expires_in.is_none());
        assert!(req.custom_code.is_none());
    }
}
