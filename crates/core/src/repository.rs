//! Persistence seams consumed by segmentation and the API layer.
//!
//! Modules accept an `Arc<dyn CrmStore>`; the in-process implementation lives
//! in `crm-store`. Every write is visible to reads issued after it returns.

use crate::activity::{ActivityEntry, NewActivity};
use crate::booking::{
    Booking, BookingId, BookingQuery, BookingStatus, BookingStatusCounts, ConfirmedSummary,
    NewBooking,
};
use crate::broadcast::{Broadcast, NewBroadcast};
use crate::error::CrmResult;
use crate::guest::{
    Guest, GuestId, GuestMetricsPatch, GuestProfileUpdate, GuestQuery, NewGuest, NewVisit, Visit,
    VisitSummary,
};
use crate::pagination::{Page, PageRequest};
use chrono::{DateTime, NaiveDate, Utc};

pub trait GuestRepository: Send + Sync {
    /// Fails with `Conflict` when the phone is already taken.
    fn insert_guest(&self, guest: NewGuest) -> CrmResult<Guest>;

    /// Returns soft-deleted guests too; callers decide visibility.
    fn get_guest(&self, id: GuestId) -> CrmResult<Option<Guest>>;

    fn find_guest_by_phone(&self, phone: &str) -> CrmResult<Option<Guest>>;

    /// Fails with `NotFound` for missing or deleted guests, `Conflict` on a taken phone.
    fn update_guest_profile(&self, id: GuestId, update: GuestProfileUpdate) -> CrmResult<Guest>;

    /// Sets `deleted_at`. Returns false if the guest is missing or already deleted.
    fn soft_delete_guest(&self, id: GuestId, at: DateTime<Utc>) -> CrmResult<bool>;

    /// Active guests only, newest id first.
    fn list_guests(&self, query: &GuestQuery, page: PageRequest) -> CrmResult<Page<Guest>>;

    /// Every guest without a soft-delete marker, ascending id.
    fn active_guests(&self) -> CrmResult<Vec<Guest>>;

    /// Atomically apply the metrics patch to one guest.
    /// Returns false when the guest no longer exists.
    fn patch_guest_metrics(&self, id: GuestId, patch: &GuestMetricsPatch) -> CrmResult<bool>;

    /// Same as [`patch_guest_metrics`](Self::patch_guest_metrics), but the
    /// deleted check and the write happen under one lock. Returns false for
    /// missing or soft-deleted guests.
    fn patch_active_guest_metrics(&self, id: GuestId, patch: &GuestMetricsPatch)
        -> CrmResult<bool>;
}

pub trait BookingRepository: Send + Sync {
    fn insert_booking(&self, booking: NewBooking) -> CrmResult<Booking>;

    fn get_booking(&self, id: BookingId) -> CrmResult<Option<Booking>>;

    /// Returns the updated booking, or `None` if it does not exist.
    fn set_booking_status(&self, id: BookingId, status: BookingStatus) -> CrmResult<Option<Booking>>;

    /// Newest `booking_time` first.
    fn list_bookings(&self, query: &BookingQuery, page: PageRequest) -> CrmResult<Page<Booking>>;

    fn confirmed_summary(&self, guest_id: GuestId) -> CrmResult<ConfirmedSummary>;

    fn booking_status_counts(&self) -> CrmResult<BookingStatusCounts>;

    /// Bookings whose `booking_time` falls in `[start, end)`.
    fn count_bookings_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CrmResult<u64>;
}

pub trait VisitRepository: Send + Sync {
    fn insert_visit(&self, visit: NewVisit) -> CrmResult<Visit>;

    fn visit_summary(&self, guest_id: GuestId) -> CrmResult<VisitSummary>;

    /// Visit counts per UTC day in `[from, to]`, ascending by day, empty days omitted.
    fn visits_by_day(&self, from: NaiveDate, to: NaiveDate) -> CrmResult<Vec<(NaiveDate, u64)>>;
}

pub trait SettingsRepository: Send + Sync {
    fn get_setting(&self, key: &str) -> CrmResult<Option<String>>;

    fn put_setting(&self, key: &str, value: &str) -> CrmResult<()>;
}

pub trait BroadcastRepository: Send + Sync {
    fn insert_broadcast(&self, broadcast: NewBroadcast) -> CrmResult<Broadcast>;

    /// Most recent first.
    fn list_broadcasts(&self, limit: usize) -> CrmResult<Vec<Broadcast>>;
}

pub trait ActivityRepository: Send + Sync {
    fn record_activity(&self, activity: NewActivity) -> CrmResult<ActivityEntry>;

    /// Most recent first.
    fn recent_activity(&self, limit: usize) -> CrmResult<Vec<ActivityEntry>>;
}

/// Everything the CRM persists.
pub trait CrmStore:
    GuestRepository
    + BookingRepository
    + VisitRepository
    + SettingsRepository
    + BroadcastRepository
    + ActivityRepository
{
}

impl<T> CrmStore for T where
    T: GuestRepository
        + BookingRepository
        + VisitRepository
        + SettingsRepository
        + BroadcastRepository
        + ActivityRepository
{
}
