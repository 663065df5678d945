//! Bulk signup alert handlers

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Extension, Json,
};
use botsentry_common::types::{AlertId, AlertStatus, Paginated};
use botsentry_core::{ApprovalAuth, DetectionSummary, RemediationError};
use botsentry_storage::models::{ApprovalSummary, Bot, BulkSignupAlert, IpBlock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::PageQuery;
use crate::auth::{AppState, AuthContext};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// List bulk signup alerts, newest first
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertListQuery>,
) -> Result<Json<Paginated<BulkSignupAlert>>, ApiError> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<AlertStatus>()
                .map_err(|_| ApiError::bad_request(format!("Unknown alert status '{}'", raw)))?,
        ),
    };
    let window = PageQuery {
        page: query.page,
        page_size: query.page_size,
    }
    .resolve()?;

    let data = state
        .repos
        .bulk_signups
        .list(status, window.page_size, window.offset)
        .await?;
    let total = state.repos.bulk_signups.count(status).await?;

    Ok(Json(Paginated {
        data,
        page: window.page,
        page_size: window.page_size,
        total,
    }))
}

/// Alert with its bots and the IP blocks recorded for its addresses
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDetailResponse {
    pub alert: BulkSignupAlert,
    pub bots: Vec<Bot>,
    pub ip_blocks: Vec<IpBlock>,
}

/// Get one alert with bot rows and related IP blocks
pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AlertId>,
) -> Result<Json<AlertDetailResponse>, ApiError> {
    let alert = state
        .repos
        .bulk_signups
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Bulk signup alert {} not found", id)))?;
    let bots = state.repos.bots.find_by_ids(&alert.bot_ids).await?;
    let ip_blocks = state.repos.bulk_signups.ip_blocks_for(&alert.ip_list).await?;

    Ok(Json(AlertDetailResponse {
        alert,
        bots,
        ip_blocks,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ApproveQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub alert_id: AlertId,
    pub status: AlertStatus,
    pub summary: ApprovalSummary,
}

#[derive(Serialize)]
struct ApprovalPage<'a> {
    title: &'a str,
    message: &'a str,
    summary: Option<&'a ApprovalSummary>,
    admin_url: &'a str,
}

fn header_mentions_json(headers: &HeaderMap, name: header::HeaderName) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

/// Clients that asked for JSON, or authenticated admins, get JSON; email
/// link clicks get an HTML page
fn wants_json(headers: &HeaderMap, is_admin: bool) -> bool {
    is_admin
        || header_mentions_json(headers, header::ACCEPT)
        || header_mentions_json(headers, header::CONTENT_TYPE)
}

fn render_page(
    state: &AppState,
    status: StatusCode,
    title: &str,
    message: &str,
    summary: Option<&ApprovalSummary>,
    admin_url: &str,
) -> Response {
    let page = ApprovalPage {
        title,
        message,
        summary,
        admin_url,
    };
    match state.templates.render("approval_result.html", &page) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("Failed to render approval page: {}", e);
            (status, format!("{}: {}", title, message)).into_response()
        }
    }
}

/// Approve an alert with an admin key or the emailed one-time token
pub async fn approve_alert(
    State(state): State<Arc<AppState>>,
    auth: Option<Extension<AuthContext>>,
    headers: HeaderMap,
    path: Result<Path<AlertId>, PathRejection>,
    query: Result<Query<ApproveQuery>, QueryRejection>,
) -> Response {
    let is_admin = auth.is_some();
    let json = wants_json(&headers, is_admin);
    let fail = |e: ApiError| {
        if json {
            e.into_response()
        } else {
            render_page(&state, e.status, "Approval failed", &e.message, None, "")
        }
    };

    let id = match path {
        Ok(Path(id)) => id,
        Err(rejection) => {
            return fail(ApiError::bad_request(format!(
                "Invalid alert id: {}",
                rejection.body_text()
            )))
        }
    };
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return fail(ApiError::bad_request(rejection.body_text())),
    };

    let approval = match (auth, query.token) {
        (Some(Extension(ctx)), _) => ApprovalAuth::Admin(ctx.actor()),
        (None, Some(token)) if !token.is_empty() => ApprovalAuth::Token(token),
        _ => {
            return fail(ApiError::unauthorized(
                "An admin API key or approval token is required",
            ))
        }
    };

    let admin_url = state.detector.admin_url(id);
    match state.remediation.approve(id, approval).await {
        Ok(summary) => {
            info!(alert_id = %id, "Bulk signup alert approved via API");
            if json {
                Json(ApprovalResponse {
                    alert_id: id,
                    status: AlertStatus::Approved,
                    summary,
                })
                .into_response()
            } else {
                render_page(
                    &state,
                    StatusCode::OK,
                    "Bulk signup approved",
                    "The bots in this cluster were suspended and their registration IPs blocked.",
                    Some(&summary),
                    &admin_url,
                )
            }
        }
        Err(e) => {
            let already = matches!(e, RemediationError::AlreadyResolved(_));
            let e = ApiError::from(e);
            if json {
                e.into_response()
            } else {
                let title = if already {
                    "Already resolved"
                } else {
                    "Approval failed"
                };
                render_page(&state, e.status, title, &e.message, None, &admin_url)
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreResponse {
    pub alert_id: AlertId,
    pub status: AlertStatus,
}

/// Close an alert without taking action
pub async fn ignore_alert(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<AlertId>,
) -> Result<Json<IgnoreResponse>, ApiError> {
    state.remediation.ignore(id, &auth.actor()).await?;
    Ok(Json(IgnoreResponse {
        alert_id: id,
        status: AlertStatus::Ignored,
    }))
}

/// Run bulk signup detection now
pub async fn force_scan(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<DetectionSummary>, ApiError> {
    info!(actor = %auth.actor(), "Forced bulk signup scan");
    Ok(Json(state.detector.run_detection().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_wants_json() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers, false));
        assert!(wants_json(&headers, true));

        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html,application/json"));
        assert!(wants_json(&headers, false));

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(wants_json(&headers, false));
    }
}
