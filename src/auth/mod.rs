//! Bearer-token identity for the API
//!
//! Accounts live with an external collaborator; this service only verifies
//! the HS256 tokens it issues and trusts the `sub` and `is_admin` claims.

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::{AuthConfig, AuthMode};
use crate::service::ServiceError;

/// Account id attached to every request when authentication is disabled
pub const LOCAL_ACCOUNT: &str = "local";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub account_id: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub is_admin: bool,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("token subject is empty")]
    EmptySubject,
    #[error("token signing is not configured")]
    SigningDisabled,
}

pub struct AuthService {
    mode: AuthMode,
    keys: Option<(EncodingKey, DecodingKey)>,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        let keys = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|secret| {
                (
                    EncodingKey::from_secret(secret.as_bytes()),
                    DecodingKey::from_secret(secret.as_bytes()),
                )
            });

        Self {
            mode: config.mode,
            keys,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        let (_, decoding_key) = self.keys.as_ref().ok_or(AuthError::SigningDisabled)?;

        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, decoding_key, &validation)?;

        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::EmptySubject);
        }

        Ok(Identity {
            account_id: data.claims.sub,
            is_admin: data.claims.is_admin,
        })
    }

    /// Mint a token; used by the admin CLI and tests.
    pub fn issue_token(
        &self,
        account_id: &str,
        is_admin: bool,
        ttl: chrono::Duration,
    ) -> Result<String, AuthError> {
        let (encoding_key, _) = self.keys.as_ref().ok_or(AuthError::SigningDisabled)?;

        let claims = Claims {
            sub: account_id.to_string(),
            is_admin,
            exp: (chrono::Utc::now() + ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, encoding_key)?)
    }

    /// The identity a request carries, if any.
    ///
    /// A present-but-invalid token is an error rather than anonymous access.
    fn identify(&self, token: Option<&str>) -> Result<Option<Identity>, AuthError> {
        match self.mode {
            AuthMode::None => Ok(Some(Identity {
                account_id: LOCAL_ACCOUNT.to_string(),
                is_admin: true,
            })),
            AuthMode::Jwt => token.map(|t| self.validate(t)).transpose(),
        }
    }
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// `?token=` is honoured only for download endpoints opened by plain links.
fn query_token(request: &Request) -> Option<String> {
    if !request.uri().path().ends_with("/export") {
        return None;
    }
    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == "token" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Resolve the caller and stash the [`Identity`] in request extensions.
pub async fn auth_middleware(
    auth_service: Arc<AuthService>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = bearer_token(&request).or_else(|| query_token(&request));

    match auth_service.identify(token.as_deref()) {
        Ok(Some(identity)) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Ok(None) => next.run(request).await,
        Err(e) => {
            debug!("Rejected bearer token: {e}");
            ServiceError::Unauthorized.into_response()
        }
    }
}

/// Caller identity when one was presented; anonymous otherwise.
pub struct MaybeUser(pub Option<Identity>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<Identity>().cloned()))
    }
}

/// Caller identity; rejects anonymous requests with 401.
pub struct AuthUser(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(AuthUser)
            .ok_or(ServiceError::Unauthorized)
    }
}
