//! Dashboard aggregates.

use crate::bookings_rest::parse_day;
use crate::rest::{ApiResult, AppState};
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use crm_core::activity::{ActivityAction, ActivityEntry, EntityType};
use crm_core::repository::{
    ActivityRepository, BookingRepository, GuestRepository, VisitRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_VISITS_WINDOW_DAYS: i64 = 90;
const DEFAULT_ACTIVITY_LIMIT: i64 = 50;
const MAX_ACTIVITY_LIMIT: i64 = 200;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatsResponse {
    pub total_bookings: u64,
    pub today_arrivals: u64,
    pub guest_count: u64,
    pub no_show_rate: f64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct VisitsByDateItem {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct VisitsByDateQuery {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecentActivityItem {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub action_type: ActivityAction,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub details: Option<Value>,
    pub summary: String,
}

impl From<ActivityEntry> for RecentActivityItem {
    fn from(entry: ActivityEntry) -> Self {
        let summary = entry.summary();
        Self {
            id: entry.id,
            created_at: entry.created_at,
            action_type: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details,
            summary,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentActivityQuery {
    pub limit: Option<i64>,
}

/// GET /api/dashboard/stats
pub async fn dashboard_stats(
    State(state): State<AppState>,
) -> ApiResult<Json<DashboardStatsResponse>> {
    let counts = state.store.booking_status_counts()?;

    let today = Utc::now().date_naive();
    let start = Utc.from_utc_datetime(&today.and_time(NaiveTime::default()));
    let today_arrivals = state
        .store
        .count_bookings_between(start, start + Duration::days(1))?;

    Ok(Json(DashboardStatsResponse {
        total_bookings: counts.total(),
        today_arrivals,
        guest_count: state.store.active_guests()?.len() as u64,
        no_show_rate: counts.no_show_rate(),
    }))
}

/// GET /api/dashboard/visits-by-date: Daily visit counts, last 90 days by default.
pub async fn visits_by_date(
    State(state): State<AppState>,
    Query(query): Query<VisitsByDateQuery>,
) -> ApiResult<Json<Vec<VisitsByDateItem>>> {
    let to = query
        .to_date
        .as_deref()
        .and_then(parse_day)
        .unwrap_or_else(|| Utc::now().date_naive());
    let from = query
        .from_date
        .as_deref()
        .and_then(parse_day)
        .unwrap_or(to - Duration::days(DEFAULT_VISITS_WINDOW_DAYS));

    let days = state.store.visits_by_day(from, to)?;
    Ok(Json(
        days.into_iter()
            .map(|(date, count)| VisitsByDateItem { date, count })
            .collect(),
    ))
}

/// GET /api/dashboard/recent-activity: Journal entries, newest first.
pub async fn recent_activity(
    State(state): State<AppState>,
    Query(query): Query<RecentActivityQuery>,
) -> ApiResult<Json<Vec<RecentActivityItem>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT) as usize;
    let entries = state.store.recent_activity(limit)?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
