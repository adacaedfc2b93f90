//! Guest REST API endpoints: CRUD, stats and the "add visit" action.

use crate::rest::{ApiError, ApiResult, AppState};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use crm_core::activity::NewActivity;
use crm_core::guest::{Guest, GuestId, GuestProfileUpdate, GuestQuery, NewGuest, NewVisit, Segment};
use crm_core::pagination::{Page, PageRequest};
use crm_core::repository::{GuestRepository, VisitRepository};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct GuestResponse {
    pub id: GuestId,
    pub name: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub segment: Segment,
    pub segment_label: &'static str,
    pub visits_count: u32,
    pub confirmed_bookings_count: u32,
    pub last_visit_at: Option<DateTime<Utc>>,
    pub is_in_stop_list: bool,
    pub exclude_from_broadcasts: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Guest> for GuestResponse {
    fn from(guest: Guest) -> Self {
        Self {
            id: guest.id,
            segment_label: guest.segment.localized_label(),
            segment: guest.segment,
            name: guest.name,
            phone: guest.phone,
            email: guest.email,
            visits_count: guest.visits_count,
            confirmed_bookings_count: guest.confirmed_bookings_count,
            last_visit_at: guest.last_visit_at,
            is_in_stop_list: guest.is_in_stop_list,
            exclude_from_broadcasts: guest.exclude_from_broadcasts,
            created_at: guest.created_at,
            updated_at: guest.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListGuestsQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct GuestStatsResponse {
    pub total: u64,
    pub vip: u64,
    pub regular: u64,
    pub new: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateGuestRequest {
    pub name: Option<String>,
    pub phone: String,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGuestRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_in_stop_list: Option<bool>,
    pub exclude_from_broadcasts: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddVisitRequest {
    pub arrived_at: Option<DateTime<Utc>>,
    pub revenue: Option<f64>,
    pub booking_id: Option<i64>,
    pub notes: Option<String>,
}

/// Trimmed value, `None` when blank.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require_phone(phone: &str) -> ApiResult<String> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(ApiError::bad_request("phone must not be empty"));
    }
    Ok(phone.to_string())
}

/// Load a guest that has not been soft-deleted.
pub(crate) fn load_active_guest(state: &AppState, id: GuestId) -> ApiResult<Guest> {
    state
        .store
        .get_guest(id)?
        .filter(Guest::is_active)
        .ok_or_else(|| ApiError::not_found("Guest not found"))
}

/// GET /api/guests: Paginated guest list with optional search.
pub async fn list_guests(
    State(state): State<AppState>,
    Query(query): Query<ListGuestsQuery>,
) -> ApiResult<Json<Page<GuestResponse>>> {
    let page = PageRequest::clamped(
        query.page,
        query.limit,
        state.config.pagination.default_limit,
        state.config.pagination.max_limit,
    );
    let filter = GuestQuery {
        search: query.search,
    };
    let guests = state.store.list_guests(&filter, page)?;
    Ok(Json(guests.map(GuestResponse::from)))
}

/// GET /api/guests/stats: Active guest totals per segment.
pub async fn guest_stats(State(state): State<AppState>) -> ApiResult<Json<GuestStatsResponse>> {
    let guests = state.store.active_guests()?;
    let count = |segment: Segment| guests.iter().filter(|g| g.segment == segment).count() as u64;
    Ok(Json(GuestStatsResponse {
        total: guests.len() as u64,
        vip: count(Segment::Vip),
        regular: count(Segment::Regular),
        new: count(Segment::New),
    }))
}

/// GET /api/guests/:id
pub async fn get_guest(
    State(state): State<AppState>,
    Path(id): Path<GuestId>,
) -> ApiResult<Json<GuestResponse>> {
    let guest = load_active_guest(&state, id)?;
    Ok(Json(guest.into()))
}

/// POST /api/guests: Register a guest. The phone must be unique.
pub async fn create_guest(
    State(state): State<AppState>,
    Json(request): Json<CreateGuestRequest>,
) -> ApiResult<(StatusCode, Json<GuestResponse>)> {
    let guest = state.store.insert_guest(NewGuest {
        phone: require_phone(&request.phone)?,
        name: non_blank(request.name),
        email: non_blank(request.email),
    })?;
    state.journal(NewActivity::guest_created(guest.id))?;
    metrics::counter!("api.guests.created").increment(1);
    info!(guest_id = guest.id, "Guest created");
    Ok((StatusCode::CREATED, Json(guest.into())))
}

/// PATCH /api/guests/:id: Edit profile fields. Blank name or email clears it.
pub async fn update_guest(
    State(state): State<AppState>,
    Path(id): Path<GuestId>,
    Json(request): Json<UpdateGuestRequest>,
) -> ApiResult<Json<GuestResponse>> {
    let phone = match request.phone {
        Some(phone) => Some(require_phone(&phone)?),
        None => None,
    };
    let update = GuestProfileUpdate {
        phone,
        name: request.name.map(|n| non_blank(Some(n))),
        email: request.email.map(|e| non_blank(Some(e))),
        is_in_stop_list: request.is_in_stop_list,
        exclude_from_broadcasts: request.exclude_from_broadcasts,
    };
    let guest = state.store.update_guest_profile(id, update)?;
    Ok(Json(guest.into()))
}

/// DELETE /api/guests/:id: Soft delete.
pub async fn delete_guest(
    State(state): State<AppState>,
    Path(id): Path<GuestId>,
) -> ApiResult<StatusCode> {
    if !state.store.soft_delete_guest(id, Utc::now())? {
        return Err(ApiError::not_found("Guest not found"));
    }
    metrics::counter!("api.guests.deleted").increment(1);
    info!(guest_id = id, "Guest soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/guests/:id/visits: Record an arrival and refresh visit metrics.
pub async fn add_visit(
    State(state): State<AppState>,
    Path(id): Path<GuestId>,
    Json(request): Json<AddVisitRequest>,
) -> ApiResult<Json<GuestResponse>> {
    load_active_guest(&state, id)?;
    if request.revenue.is_some_and(|r| !r.is_finite() || r < 0.0) {
        return Err(ApiError::bad_request("revenue must be a non-negative number"));
    }

    let visit = state.store.insert_visit(NewVisit {
        guest_id: id,
        booking_id: request.booking_id,
        arrived_at: request.arrived_at.unwrap_or_else(Utc::now),
        revenue: request.revenue,
        notes: non_blank(request.notes),
    })?;
    metrics::counter!("api.visits.recorded").increment(1);

    let guest = state
        .recalculator
        .recalculate_from_visits(id)?
        .into_guest()
        .ok_or_else(|| ApiError::not_found("Guest not found"))?;
    info!(
        guest_id = id,
        visit_id = visit.id,
        visits = guest.visits_count,
        segment = %guest.segment,
        "Visit recorded"
    );
    Ok(Json(guest.into()))
}
