//! In-memory CRM store backed by DashMap.

use chrono::{DateTime, NaiveDate, Utc};
use crm_core::activity::{ActivityEntry, ActivityId, NewActivity};
use crm_core::booking::{
    Booking, BookingId, BookingQuery, BookingStatus, BookingStatusCounts, ConfirmedSummary,
    NewBooking,
};
use crm_core::broadcast::{Broadcast, NewBroadcast};
use crm_core::guest::{
    Guest, GuestId, GuestMetricsPatch, GuestProfileUpdate, GuestQuery, NewGuest, NewVisit, Segment,
    Visit, VisitId, VisitSummary,
};
use crm_core::pagination::{Page, PageRequest};
use crm_core::repository::{
    ActivityRepository, BookingRepository, BroadcastRepository, GuestRepository,
    SettingsRepository, VisitRepository,
};
use crm_core::{CrmError, CrmResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::info;

/// Thread-safe in-memory store for every CRM table.
///
/// The phone index is always locked before the guest table so that
/// inserts and phone changes cannot deadlock each other.
pub struct MemoryStore {
    guests: DashMap<GuestId, Guest>,
    phone_index: DashMap<String, GuestId>,
    bookings: DashMap<BookingId, Booking>,
    visits: DashMap<VisitId, Visit>,
    settings: DashMap<String, String>,
    broadcasts: DashMap<i64, Broadcast>,
    activity: DashMap<ActivityId, ActivityEntry>,
    guest_seq: AtomicI64,
    booking_seq: AtomicI64,
    visit_seq: AtomicI64,
    broadcast_seq: AtomicI64,
    activity_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("CRM store initialized (in-memory)");
        Self {
            guests: DashMap::new(),
            phone_index: DashMap::new(),
            bookings: DashMap::new(),
            visits: DashMap::new(),
            settings: DashMap::new(),
            broadcasts: DashMap::new(),
            activity: DashMap::new(),
            guest_seq: AtomicI64::new(1),
            booking_seq: AtomicI64::new(1),
            visit_seq: AtomicI64::new(1),
            broadcast_seq: AtomicI64::new(1),
            activity_seq: AtomicI64::new(1),
        }
    }

    pub fn guest_count(&self) -> usize {
        self.guests.len()
    }

    fn guest_matches(guest: &Guest, needle: &str) -> bool {
        guest.phone.to_lowercase().contains(needle)
            || guest
                .name
                .as_deref()
                .map(|n| n.to_lowercase().contains(needle))
                .unwrap_or(false)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_search(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(chrono::NaiveTime::default()).and_utc();
    (start, start + chrono::Duration::days(1))
}

// ─── Guests ────────────────────────────────────────────────────────────────

impl GuestRepository for MemoryStore {
    fn insert_guest(&self, guest: NewGuest) -> CrmResult<Guest> {
        let phone = guest.phone.trim().to_string();
        match self.phone_index.entry(phone.clone()) {
            Entry::Occupied(_) => Err(CrmError::Conflict(
                "Guest with this phone already exists".to_string(),
            )),
            Entry::Vacant(slot) => {
                let id = self.guest_seq.fetch_add(1, Ordering::SeqCst);
                let record = Guest {
                    id,
                    phone,
                    name: guest.name,
                    email: guest.email,
                    visits_count: 0,
                    confirmed_bookings_count: 0,
                    segment: Segment::New,
                    last_visit_at: None,
                    is_in_stop_list: false,
                    exclude_from_broadcasts: false,
                    created_at: Utc::now(),
                    updated_at: None,
                    deleted_at: None,
                };
                slot.insert(id);
                self.guests.insert(id, record.clone());
                Ok(record)
            }
        }
    }

    fn get_guest(&self, id: GuestId) -> CrmResult<Option<Guest>> {
        Ok(self.guests.get(&id).map(|r| r.value().clone()))
    }

    fn find_guest_by_phone(&self, phone: &str) -> CrmResult<Option<Guest>> {
        let id = match self.phone_index.get(phone.trim()) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_guest(id)
    }

    fn update_guest_profile(&self, id: GuestId, update: GuestProfileUpdate) -> CrmResult<Guest> {
        let not_found = || CrmError::not_found(format!("Guest {id} not found"));
        let current_phone = match self.guests.get(&id) {
            Some(g) if g.is_active() => g.phone.clone(),
            _ => return Err(not_found()),
        };

        let new_phone = update
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| *p != current_phone)
            .map(str::to_string);

        if let Some(phone) = &new_phone {
            match self.phone_index.entry(phone.clone()) {
                Entry::Occupied(_) => {
                    return Err(CrmError::Conflict(
                        "Another guest with this phone already exists".to_string(),
                    ))
                }
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
            self.phone_index.remove(&current_phone);
        }

        let mut entry = self.guests.get_mut(&id).ok_or_else(not_found)?;
        let guest = entry.value_mut();
        if let Some(phone) = new_phone {
            guest.phone = phone;
        }
        if let Some(name) = update.name {
            guest.name = name;
        }
        if let Some(email) = update.email {
            guest.email = email;
        }
        if let Some(flag) = update.is_in_stop_list {
            guest.is_in_stop_list = flag;
        }
        if let Some(flag) = update.exclude_from_broadcasts {
            guest.exclude_from_broadcasts = flag;
        }
        guest.updated_at = Some(Utc::now());
        Ok(guest.clone())
    }

    fn soft_delete_guest(&self, id: GuestId, at: DateTime<Utc>) -> CrmResult<bool> {
        Ok(match self.guests.get_mut(&id) {
            Some(mut entry) if entry.is_active() => {
                entry.deleted_at = Some(at);
                entry.updated_at = Some(at);
                true
            }
            _ => false,
        })
    }

    fn list_guests(&self, query: &GuestQuery, page: PageRequest) -> CrmResult<Page<Guest>> {
        let needle = normalize_search(&query.search);
        let mut guests: Vec<Guest> = self
            .guests
            .iter()
            .filter(|r| r.is_active())
            .filter(|r| needle.as_deref().map(|n| Self::guest_matches(r, n)).unwrap_or(true))
            .map(|r| r.value().clone())
            .collect();
        guests.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page.paginate(guests))
    }

    fn active_guests(&self) -> CrmResult<Vec<Guest>> {
        let mut guests: Vec<Guest> = self
            .guests
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.value().clone())
            .collect();
        guests.sort_by_key(|g| g.id);
        Ok(guests)
    }

    fn patch_guest_metrics(&self, id: GuestId, patch: &GuestMetricsPatch) -> CrmResult<bool> {
        Ok(match self.guests.get_mut(&id) {
            Some(mut entry) => {
                patch.apply(entry.value_mut());
                true
            }
            None => false,
        })
    }

    fn patch_active_guest_metrics(
        &self,
        id: GuestId,
        patch: &GuestMetricsPatch,
    ) -> CrmResult<bool> {
        Ok(match self.guests.get_mut(&id) {
            Some(mut entry) if entry.is_active() => {
                patch.apply(entry.value_mut());
                true
            }
            _ => false,
        })
    }
}

// ─── Bookings ──────────────────────────────────────────────────────────────

impl BookingRepository for MemoryStore {
    fn insert_booking(&self, booking: NewBooking) -> CrmResult<Booking> {
        let id = self.booking_seq.fetch_add(1, Ordering::SeqCst);
        let record = Booking {
            id,
            guest_id: booking.guest_id,
            booking_time: booking.booking_time,
            party_size: booking.party_size,
            status: BookingStatus::Pending,
            admin_notes: None,
            created_at: Utc::now(),
        };
        self.bookings.insert(id, record.clone());
        Ok(record)
    }

    fn get_booking(&self, id: BookingId) -> CrmResult<Option<Booking>> {
        Ok(self.bookings.get(&id).map(|r| r.value().clone()))
    }

    fn set_booking_status(&self, id: BookingId, status: BookingStatus) -> CrmResult<Option<Booking>> {
        Ok(self.bookings.get_mut(&id).map(|mut entry| {
            entry.status = status;
            entry.value().clone()
        }))
    }

    fn list_bookings(&self, query: &BookingQuery, page: PageRequest) -> CrmResult<Page<Booking>> {
        let mut bookings: Vec<Booking> = self.bookings.iter().map(|r| r.value().clone()).collect();

        if let Some(day) = query.day {
            let (start, end) = day_bounds(day);
            bookings.retain(|b| b.booking_time >= start && b.booking_time < end);
        }
        if let Some(needle) = normalize_search(&query.search) {
            bookings.retain(|b| {
                self.guests
                    .get(&b.guest_id)
                    .map(|g| Self::guest_matches(&g, &needle))
                    .unwrap_or(false)
            });
        }

        bookings.sort_by(|a, b| b.booking_time.cmp(&a.booking_time).then(b.id.cmp(&a.id)));
        Ok(page.paginate(bookings))
    }

    fn confirmed_summary(&self, guest_id: GuestId) -> CrmResult<ConfirmedSummary> {
        let mut summary = ConfirmedSummary::default();
        for booking in self.bookings.iter() {
            if booking.guest_id != guest_id || booking.status != BookingStatus::Confirmed {
                continue;
            }
            summary.count += 1;
            if summary.last_booking_time.map_or(true, |t| booking.booking_time > t) {
                summary.last_booking_time = Some(booking.booking_time);
            }
        }
        Ok(summary)
    }

    fn booking_status_counts(&self) -> CrmResult<BookingStatusCounts> {
        let mut counts = BookingStatusCounts::default();
        for booking in self.bookings.iter() {
            counts.add(booking.status);
        }
        Ok(counts)
    }

    fn count_bookings_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CrmResult<u64> {
        Ok(self
            .bookings
            .iter()
            .filter(|b| b.booking_time >= start && b.booking_time < end)
            .count() as u64)
    }
}

// ─── Visits ────────────────────────────────────────────────────────────────

impl VisitRepository for MemoryStore {
    fn insert_visit(&self, visit: NewVisit) -> CrmResult<Visit> {
        let id = self.visit_seq.fetch_add(1, Ordering::SeqCst);
        let record = Visit {
            id,
            guest_id: visit.guest_id,
            booking_id: visit.booking_id,
            arrived_at: visit.arrived_at,
            revenue: visit.revenue,
            notes: visit.notes,
            created_at: Utc::now(),
        };
        self.visits.insert(id, record.clone());
        Ok(record)
    }

    fn visit_summary(&self, guest_id: GuestId) -> CrmResult<VisitSummary> {
        let mut summary = VisitSummary::default();
        for visit in self.visits.iter().filter(|v| v.guest_id == guest_id) {
            summary.count += 1;
            if summary.last_arrived_at.map_or(true, |t| visit.arrived_at > t) {
                summary.last_arrived_at = Some(visit.arrived_at);
            }
        }
        Ok(summary)
    }

    fn visits_by_day(&self, from: NaiveDate, to: NaiveDate) -> CrmResult<Vec<(NaiveDate, u64)>> {
        let mut by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for visit in self.visits.iter() {
            let day = visit.arrived_at.date_naive();
            if day >= from && day <= to {
                *by_day.entry(day).or_default() += 1;
            }
        }
        Ok(by_day.into_iter().collect())
    }
}

// ─── Settings ──────────────────────────────────────────────────────────────

impl SettingsRepository for MemoryStore {
    fn get_setting(&self, key: &str) -> CrmResult<Option<String>> {
        Ok(self.settings.get(key).map(|v| v.value().clone()))
    }

    fn put_setting(&self, key: &str, value: &str) -> CrmResult<()> {
        self.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ─── Broadcasts ────────────────────────────────────────────────────────────

impl BroadcastRepository for MemoryStore {
    fn insert_broadcast(&self, broadcast: NewBroadcast) -> CrmResult<Broadcast> {
        let id = self.broadcast_seq.fetch_add(1, Ordering::SeqCst);
        let record = Broadcast {
            id,
            name: format!("Broadcast: {}", broadcast.audience.display_name()),
            message_text: broadcast.message_text,
            image_url: broadcast.image_url,
            audience: broadcast.audience,
            recipient_ids: broadcast.recipient_ids,
            created_at: Utc::now(),
        };
        self.broadcasts.insert(id, record.clone());
        Ok(record)
    }

    fn list_broadcasts(&self, limit: usize) -> CrmResult<Vec<Broadcast>> {
        let mut broadcasts: Vec<Broadcast> =
            self.broadcasts.iter().map(|r| r.value().clone()).collect();
        broadcasts.sort_by(|a, b| b.id.cmp(&a.id));
        broadcasts.truncate(limit);
        Ok(broadcasts)
    }
}

// ─── Activity ──────────────────────────────────────────────────────────────

impl ActivityRepository for MemoryStore {
    fn record_activity(&self, activity: NewActivity) -> CrmResult<ActivityEntry> {
        let id = self.activity_seq.fetch_add(1, Ordering::SeqCst);
        let record = ActivityEntry {
            id,
            action: activity.action,
            entity_type: activity.entity_type,
            entity_id: activity.entity_id,
            details: activity.details,
            created_at: Utc::now(),
        };
        self.activity.insert(id, record.clone());
        Ok(record)
    }

    fn recent_activity(&self, limit: usize) -> CrmResult<Vec<ActivityEntry>> {
        let mut entries: Vec<ActivityEntry> =
            self.activity.iter().map(|r| r.value().clone()).collect();
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crm_core::activity::ActivityAction;
    use crm_core::broadcast::BroadcastAudience;

    fn new_guest(phone: &str, name: &str) -> NewGuest {
        NewGuest {
            phone: phone.to_string(),
            name: Some(name.to_string()),
            email: None,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_insert_guest_rejects_duplicate_phone() {
        let store = MemoryStore::new();
        let guest = store.insert_guest(new_guest(" +7001 ", "Anna")).unwrap();
        assert_eq!(guest.phone, "+7001");
        assert_eq!(guest.segment, Segment::New);
        let err = store.insert_guest(new_guest("+7001", "Boris")).unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));
        assert_eq!(store.guest_count(), 1);
    }

    #[test]
    fn test_update_phone_moves_index() {
        let store = MemoryStore::new();
        let anna = store.insert_guest(new_guest("+7001", "Anna")).unwrap();
        let boris = store.insert_guest(new_guest("+7002", "Boris")).unwrap();

        let err = store
            .update_guest_profile(
                boris.id,
                GuestProfileUpdate {
                    phone: Some("+7001".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));

        let updated = store
            .update_guest_profile(
                anna.id,
                GuestProfileUpdate {
                    phone: Some("+7009".to_string()),
                    name: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.phone, "+7009");
        assert!(updated.name.is_none());
        assert!(store.find_guest_by_phone("+7001").unwrap().is_none());
        assert_eq!(store.find_guest_by_phone("+7009").unwrap().unwrap().id, anna.id);
    }

    #[test]
    fn test_soft_delete_hides_guest_from_lists() {
        let store = MemoryStore::new();
        let anna = store.insert_guest(new_guest("+7001", "Anna")).unwrap();
        store.insert_guest(new_guest("+7002", "Boris")).unwrap();

        assert!(store.soft_delete_guest(anna.id, Utc::now()).unwrap());
        assert!(!store.soft_delete_guest(anna.id, Utc::now()).unwrap());

        let active = store.active_guests().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name.as_deref(), Some("Boris"));
        // Still readable directly.
        assert!(store.get_guest(anna.id).unwrap().unwrap().deleted_at.is_some());
    }

    #[test]
    fn test_active_patch_refuses_deleted_guest() {
        let store = MemoryStore::new();
        let anna = store.insert_guest(new_guest("+7001", "Anna")).unwrap();
        let patch = GuestMetricsPatch {
            segment: Some(Segment::Vip),
            ..Default::default()
        };

        store.soft_delete_guest(anna.id, Utc::now()).unwrap();
        assert!(!store.patch_active_guest_metrics(anna.id, &patch).unwrap());
        assert!(!store.patch_active_guest_metrics(999, &patch).unwrap());
        assert_eq!(store.get_guest(anna.id).unwrap().unwrap().segment, Segment::New);

        // The unguarded patch still reaches deleted records.
        assert!(store.patch_guest_metrics(anna.id, &patch).unwrap());
    }

    #[test]
    fn test_list_guests_search_and_order() {
        let store = MemoryStore::new();
        store.insert_guest(new_guest("+7001", "Anna")).unwrap();
        store.insert_guest(new_guest("+7002", "Annette")).unwrap();
        store.insert_guest(new_guest("+7003", "Boris")).unwrap();

        let page = store
            .list_guests(
                &GuestQuery { search: Some(" ANN ".to_string()) },
                PageRequest { page: 1, limit: 10 },
            )
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].name.as_deref(), Some("Annette"));
    }

    #[test]
    fn test_confirmed_summary_tracks_status_changes() {
        let store = MemoryStore::new();
        let guest = store.insert_guest(new_guest("+7001", "Anna")).unwrap();
        let b1 = store
            .insert_booking(NewBooking { guest_id: guest.id, booking_time: at(1, 19), party_size: 2 })
            .unwrap();
        let b2 = store
            .insert_booking(NewBooking { guest_id: guest.id, booking_time: at(5, 20), party_size: 4 })
            .unwrap();

        assert_eq!(store.confirmed_summary(guest.id).unwrap(), ConfirmedSummary::default());

        store.set_booking_status(b1.id, BookingStatus::Confirmed).unwrap();
        store.set_booking_status(b2.id, BookingStatus::Confirmed).unwrap();
        let summary = store.confirmed_summary(guest.id).unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.last_booking_time, Some(at(5, 20)));

        store.set_booking_status(b2.id, BookingStatus::Canceled).unwrap();
        let summary = store.confirmed_summary(guest.id).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.last_booking_time, Some(at(1, 19)));
    }

    #[test]
    fn test_list_bookings_day_filter() {
        let store = MemoryStore::new();
        let guest = store.insert_guest(new_guest("+7001", "Anna")).unwrap();
        for (day, hour) in [(1, 12), (1, 23), (2, 0)] {
            store
                .insert_booking(NewBooking { guest_id: guest.id, booking_time: at(day, hour), party_size: 2 })
                .unwrap();
        }
        let query = BookingQuery {
            search: None,
            day: NaiveDate::from_ymd_opt(2026, 3, 1),
        };
        let page = store.list_bookings(&query, PageRequest { page: 1, limit: 10 }).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].booking_time, at(1, 23));
    }

    #[test]
    fn test_visits_by_day() {
        let store = MemoryStore::new();
        let guest = store.insert_guest(new_guest("+7001", "Anna")).unwrap();
        for (day, hour) in [(1, 12), (1, 20), (3, 19)] {
            store
                .insert_visit(NewVisit {
                    guest_id: guest.id,
                    booking_id: None,
                    arrived_at: at(day, hour),
                    revenue: None,
                    notes: None,
                })
                .unwrap();
        }
        let days = store
            .visits_by_day(
                NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            )
            .unwrap();
        assert_eq!(days, vec![(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), 2)]);

        let summary = store.visit_summary(guest.id).unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.last_arrived_at, Some(at(3, 19)));
    }

    #[test]
    fn test_broadcast_history_most_recent_first() {
        let store = MemoryStore::new();
        for text in ["first", "second", "third"] {
            store
                .insert_broadcast(NewBroadcast {
                    message_text: text.to_string(),
                    image_url: None,
                    audience: BroadcastAudience::Segment(Segment::Vip),
                    recipient_ids: vec![],
                })
                .unwrap();
        }
        let history = store.list_broadcasts(2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message_text, "third");
        assert_eq!(history[0].name, "Broadcast: VIP");
    }

    #[test]
    fn test_recent_activity_newest_first() {
        let store = MemoryStore::new();
        store.record_activity(NewActivity::guest_created(1)).unwrap();
        store.record_activity(NewActivity::booking_created(7, 1)).unwrap();
        store
            .record_activity(NewActivity::booking_status_changed(
                7,
                BookingStatus::Pending,
                BookingStatus::Confirmed,
            ))
            .unwrap();

        let recent = store.recent_activity(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, ActivityAction::BookingStatusChanged);
        assert_eq!(recent[1].action, ActivityAction::BookingCreated);
        assert_eq!(recent[1].entity_id, 7);
    }
}
