use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ErrorResponse;
use crate::analytics::{StatsSummary, VisitRange};
use crate::auth::{AuthUser, MaybeUser};
use crate::models::{CreateLinkRequest, CreateLinkResponse, Link, OwnerSummary, StoreTotals};
use crate::service::{Dashboard, ExportBundle, LinkService, ServiceError, ServiceResult};

pub struct AppState {
    pub service: Arc<LinkService>,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub expired: u64,
    pub purged: u64,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Create a new short link
pub async fn create_url(
    State(state): State<Arc<AppState>>,
    MaybeUser(caller): MaybeUser,
    payload: Result<Json<CreateLinkRequest>, JsonRejection>,
) -> ServiceResult<(StatusCode, Json<CreateLinkResponse>)> {
    let Json(request) = payload.map_err(|e| ServiceError::Validation(e.body_text()))?;
    let created = state.service.create(request, caller.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List the caller's links, newest first
pub async fn list_urls(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Query(query): Query<ListQuery>,
) -> ServiceResult<Json<Vec<Link>>> {
    let links = state
        .service
        .list_owned(&caller, query.limit, query.offset)
        .await?;
    Ok(Json(links))
}

/// Visit statistics for one link
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    MaybeUser(caller): MaybeUser,
    Path(code): Path<String>,
    Query(range): Query<VisitRange>,
) -> ServiceResult<Json<StatsSummary>> {
    let summary = state.service.stats(&code, caller.as_ref(), range).await?;
    Ok(Json(summary))
}

/// Download visit statistics as CSV
pub async fn export_stats(
    State(state): State<Arc<AppState>>,
    MaybeUser(caller): MaybeUser,
    Path(code): Path<String>,
    Query(range): Query<VisitRange>,
) -> ServiceResult<Response> {
    let body = state
        .service
        .export_stats(&code, caller.as_ref(), range)
        .await?;

    let filename = format!(
        "stats_{}_{}.csv",
        code,
        chrono::Utc::now().format("%Y%m%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

/// Delete a link and its visits
pub async fn delete_url(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(code): Path<String>,
) -> ServiceResult<Json<SuccessResponse>> {
    state.service.delete(&code, &caller).await?;
    Ok(Json(SuccessResponse {
        message: "Short link deleted".to_string(),
    }))
}

/// Run the expiry sweep now
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> ServiceResult<Json<CleanupResponse>> {
    let report = state.service.cleanup(&caller).await?;
    Ok(Json(CleanupResponse {
        message: "Expired links cleaned up".to_string(),
        expired: report.expired,
        purged: report.purged,
    }))
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> ServiceResult<Json<Dashboard>> {
    Ok(Json(state.service.dashboard(&caller).await?))
}

pub async fn admin_stats(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> ServiceResult<Json<StoreTotals>> {
    Ok(Json(state.service.admin_totals(&caller).await?))
}

pub async fn admin_users(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> ServiceResult<Json<Vec<OwnerSummary>>> {
    Ok(Json(state.service.admin_users(&caller).await?))
}

pub async fn admin_user_links(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(account_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ServiceResult<Json<Vec<Link>>> {
    let links = state
        .service
        .admin_user_links(&caller, &account_id, query.limit, query.offset)
        .await?;
    Ok(Json(links))
}

pub async fn admin_export(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> ServiceResult<Response> {
    let bundle: ExportBundle = state.service.admin_export(&caller).await?;
    let filename = format!("export_{}.json", chrono::Utc::now().format("%Y%m%d"));
    Ok((
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )],
        Json(bundle),
    )
        .into_response())
}

/// Accounts are managed by the external identity service
pub async fn auth_not_implemented() -> impl IntoResponse {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(ErrorResponse {
            error: "Accounts are managed by the identity service".to_string(),
        }),
    )
}
