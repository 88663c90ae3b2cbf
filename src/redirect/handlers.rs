use axum::{
    extract::{ConnectInfo, Path, State},
    http::{
        header::{self, HeaderMap, HeaderValue},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::middleware::RequestStart;
use crate::config::VisitConfig;
use crate::service::{LinkService, ServiceError};
use crate::visits::extract_client_ip;

pub struct RedirectState {
    pub service: Arc<LinkService>,
    pub visits: VisitConfig,
    pub status: StatusCode,
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

/// Redirect to the original URL and queue the visit.
pub async fn redirect_url(
    State(state): State<Arc<RedirectState>>,
    Path(code): Path<String>,
    Extension(RequestStart(request_start)): Extension<RequestStart>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let link = match state.service.resolve(&code).await {
        Ok(link) => link,
        Err(ServiceError::NotFound) => {
            return (StatusCode::NOT_FOUND, "Short link not found").into_response();
        }
        Err(e) => {
            tracing::error!(short_code = %code, "Redirect lookup failed: {e:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    let location = match HeaderValue::from_str(&link.original_url) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!(short_code = %code, "Stored URL is not a valid Location header");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    let client_ip = extract_client_ip(&headers, addr.ip(), &state.visits);
    state.service.record_visit(
        &code,
        header_string(&headers, header::REFERER),
        header_string(&headers, header::USER_AGENT),
        client_ip,
    );

    let mut response = state.status.into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::LOCATION, location);
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response_headers.insert(
        "x-snip-timing-total-ms",
        HeaderValue::from(request_start.elapsed().as_millis() as u64),
    );
    response
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
