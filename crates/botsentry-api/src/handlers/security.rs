//! Content review handlers: stats, reports, flagged bots and forced runs

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use botsentry_common::types::{BotId, BotStatus, Paginated};
use botsentry_core::ReviewSummary;
use botsentry_storage::models::{Bot, EmailFlag, SecurityReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::{parse_date, PageQuery};
use crate::auth::{AppState, AuthContext};
use crate::error::ApiError;

const RECENT_REPORTS: i64 = 7;
const DEFAULT_REPORT_LIMIT: i64 = 30;
const MAX_REPORT_LIMIT: i64 = 365;
const MAX_FLAG_HISTORY: i64 = 500;

/// Overview of the security subsystem
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityStatsResponse {
    pub bots_by_status: BTreeMap<String, i64>,
    pub total_flags: i64,
    pub recent_reports: Vec<SecurityReport>,
}

/// Get bot counts per status, total flags and the latest reports
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SecurityStatsResponse>, ApiError> {
    let mut bots_by_status: BTreeMap<String, i64> = [
        BotStatus::Normal,
        BotStatus::Flagged,
        BotStatus::UnderReview,
        BotStatus::Suspended,
    ]
    .into_iter()
    .map(|s| (s.as_str().to_string(), 0))
    .collect();
    for row in state.repos.bots.count_by_status().await? {
        bots_by_status.insert(row.status, row.count);
    }

    Ok(Json(SecurityStatsResponse {
        bots_by_status,
        total_flags: state.repos.flags.count().await?,
        recent_reports: state.repos.reports.list_recent(RECENT_REPORTS).await?,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReportListQuery {
    pub limit: Option<i64>,
}

/// List recent daily reports, newest first
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<Vec<SecurityReport>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_REPORT_LIMIT)
        .clamp(1, MAX_REPORT_LIMIT);
    Ok(Json(state.repos.reports.list_recent(limit).await?))
}

/// Get the report for one date
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<SecurityReport>, ApiError> {
    let date = parse_date(&date)?;
    state
        .repos
        .reports
        .get(date)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No report for {}", date)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedBotsQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// List bots in a restricted status, most flagged first
pub async fn list_flagged_bots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FlaggedBotsQuery>,
) -> Result<Json<Paginated<Bot>>, ApiError> {
    let statuses: Vec<BotStatus> = match query.status.as_deref() {
        None | Some("") => BotStatus::restricted().to_vec(),
        Some(raw) => {
            let status: BotStatus = raw
                .parse()
                .map_err(|_| ApiError::bad_request(format!("Unknown status '{}'", raw)))?;
            if status == BotStatus::Normal {
                return Err(ApiError::bad_request(
                    "status must be flagged, under_review or suspended",
                ));
            }
            vec![status]
        }
    };
    let window = PageQuery {
        page: query.page,
        page_size: query.page_size,
    }
    .resolve()?;

    let data = state
        .repos
        .bots
        .list_by_statuses(&statuses, window.page_size, window.offset)
        .await?;
    let total = state.repos.bots.count_by_statuses(&statuses).await?;

    Ok(Json(Paginated {
        data,
        page: window.page,
        page_size: window.page_size,
        total,
    }))
}

/// Flag history of one bot
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotFlagsResponse {
    pub bot: Bot,
    pub flags: Vec<EmailFlag>,
}

/// Get a bot's flag history, newest first
pub async fn get_bot_flags(
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<BotId>,
) -> Result<Json<BotFlagsResponse>, ApiError> {
    let bot = state
        .repos
        .bots
        .get(bot_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Bot {} not found", bot_id)))?;
    let flags = state.repos.flags.list_for_bot(bot_id, MAX_FLAG_HISTORY).await?;

    Ok(Json(BotFlagsResponse { bot, flags }))
}

#[derive(Debug, Deserialize)]
pub struct ForceReviewQuery {
    pub date: Option<String>,
}

/// Run the daily review now, for `date` or yesterday
pub async fn force_review(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ForceReviewQuery>,
) -> Result<Json<ReviewSummary>, ApiError> {
    let date = query.date.as_deref().map(parse_date).transpose()?;
    info!(actor = %auth.actor(), date = ?date, "Forced daily review");

    Ok(Json(state.engine.run_daily_review(date).await?))
}
