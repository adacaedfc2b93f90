//! Booking REST API endpoints.

use crate::guests_rest::load_active_guest;
use crate::rest::{ApiError, ApiResult, AppState};
use crate::settings_rest::read_setting;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use crm_core::activity::NewActivity;
use crm_core::booking::{Booking, BookingId, BookingQuery, BookingStatus, NewBooking};
use crm_core::guest::GuestId;
use crm_core::pagination::{Page, PageRequest};
use crm_core::repository::{BookingRepository, GuestRepository};
use crm_core::settings::WEBHOOK_URL;
use crm_core::CrmResult;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct GuestBrief {
    pub id: GuestId,
    pub name: Option<String>,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingResponse {
    pub id: BookingId,
    pub guest_id: GuestId,
    pub guest: Option<GuestBrief>,
    pub booking_time: DateTime<Utc>,
    pub guests_count: u32,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListBookingsQuery {
    pub search: Option<String>,
    pub date: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub guest_id: GuestId,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM` or `HH:MM:SS`
    pub time: String,
    pub persons: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

fn to_response(state: &AppState, booking: Booking) -> CrmResult<BookingResponse> {
    let guest = state.store.get_guest(booking.guest_id)?.map(|g| GuestBrief {
        id: g.id,
        name: g.name,
        phone: g.phone,
    });
    Ok(BookingResponse {
        id: booking.id,
        guest_id: booking.guest_id,
        guest,
        booking_time: booking.booking_time,
        guests_count: booking.party_size,
        status: booking.status,
        created_at: booking.created_at,
    })
}

/// Parse a day given as `YYYY-MM-DD`; anything after the first ten characters is ignored.
pub(crate) fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// GET /api/bookings: Paginated booking list, newest first.
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListBookingsQuery>,
) -> ApiResult<Json<Page<BookingResponse>>> {
    let page = PageRequest::clamped(
        query.page,
        query.limit,
        state.config.pagination.default_limit,
        state.config.pagination.max_limit,
    );
    let filter = BookingQuery {
        search: query.search,
        day: query.date.as_deref().and_then(parse_day),
    };
    let bookings = state.store.list_bookings(&filter, page)?;

    let mut items = Vec::with_capacity(bookings.items.len());
    for booking in bookings.items {
        items.push(to_response(&state, booking)?);
    }
    Ok(Json(Page {
        items,
        total: bookings.total,
        page: bookings.page,
        limit: bookings.limit,
    }))
}

/// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<BookingId>,
) -> ApiResult<Json<BookingResponse>> {
    let booking = state
        .store
        .get_booking(id)?
        .ok_or_else(|| ApiError::not_found("Booking not found"))?;
    Ok(Json(to_response(&state, booking)?))
}

/// POST /api/bookings: Create a pending booking and notify the booking webhook.
pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> ApiResult<(StatusCode, Json<BookingResponse>)> {
    let guest = load_active_guest(&state, request.guest_id)?;
    let date = parse_day(&request.date)
        .ok_or_else(|| ApiError::bad_request("Invalid date format (use YYYY-MM-DD)"))?;
    let time = parse_time(&request.time)
        .ok_or_else(|| ApiError::bad_request("Invalid time format (use HH:MM or HH:MM:SS)"))?;
    let party_size = u32::try_from(request.persons)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| ApiError::bad_request("persons must be >= 1"))?;

    let booking = state.store.insert_booking(NewBooking {
        guest_id: guest.id,
        booking_time: Utc.from_utc_datetime(&date.and_time(time)),
        party_size,
    })?;
    state.journal(NewActivity::booking_created(booking.id, guest.id))?;
    metrics::counter!("api.bookings.created").increment(1);
    info!(booking_id = booking.id, guest_id = guest.id, "Booking created");

    let webhook_url = read_setting(&state, WEBHOOK_URL)?;
    state.webhooks.dispatch(
        &webhook_url,
        json!({
            "event": "booking_created",
            "booking_id": booking.id,
            "guest_id": guest.id,
            "guest_name": guest.name.clone().unwrap_or_default(),
            "guest_phone": guest.phone.clone(),
            "booking_time": booking.booking_time,
            "persons": booking.party_size,
            "status": booking.status,
        }),
    );

    Ok((StatusCode::CREATED, Json(to_response(&state, booking)?)))
}

/// PATCH /api/bookings/:id/status: Change status and recount the guest's confirmed bookings.
pub async fn update_booking_status(
    State(state): State<AppState>,
    Path(id): Path<BookingId>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<Json<BookingResponse>> {
    let status: BookingStatus = request.status.parse().map_err(ApiError::bad_request)?;
    let previous = state
        .store
        .get_booking(id)?
        .ok_or_else(|| ApiError::not_found("Booking not found"))?
        .status;
    let booking = state
        .store
        .set_booking_status(id, status)?
        .ok_or_else(|| ApiError::not_found("Booking not found"))?;
    if previous != status {
        state.journal(NewActivity::booking_status_changed(id, previous, status))?;
    }

    // The status write above is already visible to the recount.
    state.recalculator.recalculate_from_bookings(booking.guest_id)?;

    metrics::counter!("api.bookings.status_changed", "status" => status.as_str()).increment(1);
    info!(booking_id = id, status = %status, "Booking status updated");
    Ok(Json(to_response(&state, booking)?))
}
