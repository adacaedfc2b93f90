//! Bulk reclassification of every active guest against the current thresholds.

use crate::thresholds::ThresholdSource;
use crm_core::guest::GuestMetricsPatch;
use crm_core::repository::GuestRepository;
use crm_core::{CrmResult, CrmStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Active guests examined.
    pub total: u64,
    /// Guests whose segment was overwritten.
    pub updated: u64,
}

pub struct SegmentReconciler {
    store: Arc<dyn CrmStore>,
    thresholds: Arc<dyn ThresholdSource>,
}

impl SegmentReconciler {
    pub fn new(store: Arc<dyn CrmStore>, thresholds: Arc<dyn ThresholdSource>) -> Self {
        Self { store, thresholds }
    }

    /// Reapply the classifier to all guests without a soft-delete marker.
    /// Only `segment` is written; counters and timestamps are left alone.
    pub fn reconcile_all(&self) -> CrmResult<ReconcileReport> {
        let start = Instant::now();
        let thresholds = self.thresholds.thresholds()?;
        let guests = self.store.active_guests()?;

        let mut report = ReconcileReport {
            total: guests.len() as u64,
            updated: 0,
        };

        for guest in guests {
            let segment = thresholds.classify(guest.visits_count);
            if segment == guest.segment {
                continue;
            }
            let patch = GuestMetricsPatch {
                segment: Some(segment),
                ..Default::default()
            };
            // A guest deleted after the snapshot is skipped.
            if self.store.patch_active_guest_metrics(guest.id, &patch)? {
                debug!(
                    guest_id = guest.id,
                    old = %guest.segment,
                    new = %segment,
                    "Segment reconciled"
                );
                report.updated += 1;
            }
        }

        metrics::counter!("segmentation.reconcile_runs").increment(1);
        metrics::counter!("segmentation.reconcile_updated").increment(report.updated);
        metrics::counter!("segmentation.segment_changes").increment(report.updated);
        info!(
            total = report.total,
            updated = report.updated,
            regular = thresholds.regular(),
            vip = thresholds.vip(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Segment reconciliation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::{SegmentThresholds, SettingsThresholds};
    use chrono::{DateTime, NaiveDate, Utc};
    use crm_core::activity::{ActivityEntry, NewActivity};
    use crm_core::booking::{
        Booking, BookingId, BookingQuery, BookingStatus, BookingStatusCounts, ConfirmedSummary,
        NewBooking,
    };
    use crm_core::broadcast::{Broadcast, NewBroadcast};
    use crm_core::config::SegmentationConfig;
    use crm_core::guest::{
        Guest, GuestId, GuestProfileUpdate, GuestQuery, NewGuest, NewVisit, Segment, Visit,
        VisitSummary,
    };
    use crm_core::pagination::{Page, PageRequest};
    use crm_core::repository::{
        ActivityRepository, BookingRepository, BroadcastRepository, SettingsRepository,
        VisitRepository,
    };
    use crm_core::settings::{SEGMENT_REGULAR_THRESHOLD, SEGMENT_VIP_THRESHOLD};
    use crm_store::MemoryStore;

    /// Soft-deletes every guest right after handing out the active snapshot,
    /// as a concurrent DELETE request landing mid-run would.
    struct DeleteAfterSnapshot(Arc<MemoryStore>);

    impl GuestRepository for DeleteAfterSnapshot {
        fn insert_guest(&self, guest: NewGuest) -> CrmResult<Guest> {
            self.0.insert_guest(guest)
        }
        fn get_guest(&self, id: GuestId) -> CrmResult<Option<Guest>> {
            self.0.get_guest(id)
        }
        fn find_guest_by_phone(&self, phone: &str) -> CrmResult<Option<Guest>> {
            self.0.find_guest_by_phone(phone)
        }
        fn update_guest_profile(&self, id: GuestId, update: GuestProfileUpdate) -> CrmResult<Guest> {
            self.0.update_guest_profile(id, update)
        }
        fn soft_delete_guest(&self, id: GuestId, at: DateTime<Utc>) -> CrmResult<bool> {
            self.0.soft_delete_guest(id, at)
        }
        fn list_guests(&self, query: &GuestQuery, page: PageRequest) -> CrmResult<Page<Guest>> {
            self.0.list_guests(query, page)
        }
        fn active_guests(&self) -> CrmResult<Vec<Guest>> {
            let snapshot = self.0.active_guests()?;
            for guest in &snapshot {
                self.0.soft_delete_guest(guest.id, Utc::now())?;
            }
            Ok(snapshot)
        }
        fn patch_guest_metrics(&self, id: GuestId, patch: &GuestMetricsPatch) -> CrmResult<bool> {
            self.0.patch_guest_metrics(id, patch)
        }
        fn patch_active_guest_metrics(
            &self,
            id: GuestId,
            patch: &GuestMetricsPatch,
        ) -> CrmResult<bool> {
            self.0.patch_active_guest_metrics(id, patch)
        }
    }

    impl BookingRepository for DeleteAfterSnapshot {
        fn insert_booking(&self, booking: NewBooking) -> CrmResult<Booking> {
            self.0.insert_booking(booking)
        }
        fn get_booking(&self, id: BookingId) -> CrmResult<Option<Booking>> {
            self.0.get_booking(id)
        }
        fn set_booking_status(
            &self,
            id: BookingId,
            status: BookingStatus,
        ) -> CrmResult<Option<Booking>> {
            self.0.set_booking_status(id, status)
        }
        fn list_bookings(&self, query: &BookingQuery, page: PageRequest) -> CrmResult<Page<Booking>> {
            self.0.list_bookings(query, page)
        }
        fn confirmed_summary(&self, guest_id: GuestId) -> CrmResult<ConfirmedSummary> {
            self.0.confirmed_summary(guest_id)
        }
        fn booking_status_counts(&self) -> CrmResult<BookingStatusCounts> {
            self.0.booking_status_counts()
        }
        fn count_bookings_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CrmResult<u64> {
            self.0.count_bookings_between(start, end)
        }
    }

    impl VisitRepository for DeleteAfterSnapshot {
        fn insert_visit(&self, visit: NewVisit) -> CrmResult<Visit> {
            self.0.insert_visit(visit)
        }
        fn visit_summary(&self, guest_id: GuestId) -> CrmResult<VisitSummary> {
            self.0.visit_summary(guest_id)
        }
        fn visits_by_day(&self, from: NaiveDate, to: NaiveDate) -> CrmResult<Vec<(NaiveDate, u64)>> {
            self.0.visits_by_day(from, to)
        }
    }

    impl SettingsRepository for DeleteAfterSnapshot {
        fn get_setting(&self, key: &str) -> CrmResult<Option<String>> {
            self.0.get_setting(key)
        }
        fn put_setting(&self, key: &str, value: &str) -> CrmResult<()> {
            self.0.put_setting(key, value)
        }
    }

    impl ActivityRepository for DeleteAfterSnapshot {
        fn record_activity(&self, activity: NewActivity) -> CrmResult<ActivityEntry> {
            self.0.record_activity(activity)
        }
        fn recent_activity(&self, limit: usize) -> CrmResult<Vec<ActivityEntry>> {
            self.0.recent_activity(limit)
        }
    }

    impl BroadcastRepository for DeleteAfterSnapshot {
        fn insert_broadcast(&self, broadcast: NewBroadcast) -> CrmResult<Broadcast> {
            self.0.insert_broadcast(broadcast)
        }
        fn list_broadcasts(&self, limit: usize) -> CrmResult<Vec<Broadcast>> {
            self.0.list_broadcasts(limit)
        }
    }

    fn seed(store: &MemoryStore, phone: &str, visits: u32, segment: Segment) -> Guest {
        let guest = store
            .insert_guest(NewGuest {
                phone: phone.to_string(),
                ..Default::default()
            })
            .unwrap();
        store
            .patch_guest_metrics(
                guest.id,
                &GuestMetricsPatch {
                    visits_count: Some(visits),
                    segment: Some(segment),
                    ..Default::default()
                },
            )
            .unwrap();
        store.get_guest(guest.id).unwrap().unwrap()
    }

    fn reconciler(store: &Arc<MemoryStore>, thresholds: SegmentThresholds) -> SegmentReconciler {
        SegmentReconciler::new(store.clone(), Arc::new(thresholds))
    }

    #[test]
    fn test_default_threshold_scenarios() {
        let store = Arc::new(MemoryStore::new());
        let four = seed(&store, "+1", 4, Segment::Vip);
        let five = seed(&store, "+2", 5, Segment::New);
        let ten = seed(&store, "+3", 10, Segment::New);

        let report = reconciler(&store, SegmentThresholds::new(5, 10))
            .reconcile_all()
            .unwrap();
        assert_eq!(report, ReconcileReport { total: 3, updated: 3 });

        let segment_of = |id| store.get_guest(id).unwrap().unwrap().segment;
        assert_eq!(segment_of(four.id), Segment::New);
        assert_eq!(segment_of(five.id), Segment::Regular);
        assert_eq!(segment_of(ten.id), Segment::Vip);
    }

    #[test]
    fn test_second_run_converges() {
        let store = Arc::new(MemoryStore::new());
        for (i, visits) in [0, 3, 7, 12, 30].into_iter().enumerate() {
            seed(&store, &format!("+9{i}"), visits, Segment::New);
        }
        let reconciler = reconciler(&store, SegmentThresholds::default());
        assert_eq!(reconciler.reconcile_all().unwrap().updated, 3);
        assert_eq!(
            reconciler.reconcile_all().unwrap(),
            ReconcileReport { total: 5, updated: 0 }
        );
    }

    #[test]
    fn test_soft_deleted_guests_are_untouched() {
        let store = Arc::new(MemoryStore::new());
        let active = seed(&store, "+10", 12, Segment::New);
        let deleted = seed(&store, "+11", 12, Segment::New);
        store.soft_delete_guest(deleted.id, Utc::now()).unwrap();

        let report = reconciler(&store, SegmentThresholds::default())
            .reconcile_all()
            .unwrap();
        assert_eq!(report, ReconcileReport { total: 1, updated: 1 });
        assert_eq!(store.get_guest(active.id).unwrap().unwrap().segment, Segment::Vip);
        assert_eq!(store.get_guest(deleted.id).unwrap().unwrap().segment, Segment::New);
    }

    #[test]
    fn test_guest_deleted_mid_run_is_not_written() {
        let store = Arc::new(MemoryStore::new());
        let guest = seed(&store, "+12", 12, Segment::New);

        let racing = Arc::new(DeleteAfterSnapshot(store.clone()));
        let report = SegmentReconciler::new(racing, Arc::new(SegmentThresholds::default()))
            .reconcile_all()
            .unwrap();
        assert_eq!(report, ReconcileReport { total: 1, updated: 0 });

        let after = store.get_guest(guest.id).unwrap().unwrap();
        assert!(after.deleted_at.is_some());
        assert_eq!(after.segment, Segment::New);
    }

    #[test]
    fn test_only_segment_is_written() {
        let store = Arc::new(MemoryStore::new());
        let before = seed(&store, "+20", 6, Segment::New);
        reconciler(&store, SegmentThresholds::default())
            .reconcile_all()
            .unwrap();
        let after = store.get_guest(before.id).unwrap().unwrap();
        assert_eq!(after.segment, Segment::Regular);
        assert_eq!(after.visits_count, before.visits_count);
        assert_eq!(after.last_visit_at, before.last_visit_at);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[test]
    fn test_invalid_stored_thresholds_are_repaired() {
        let store = Arc::new(MemoryStore::new());
        let guest = seed(&store, "+30", 9, Segment::New);
        store.put_setting(SEGMENT_REGULAR_THRESHOLD, "8").unwrap();
        store.put_setting(SEGMENT_VIP_THRESHOLD, "3").unwrap();

        let source = SettingsThresholds::new(store.clone(), &SegmentationConfig::default());
        let reconciler = SegmentReconciler::new(store.clone(), Arc::new(source));
        assert_eq!(reconciler.reconcile_all().unwrap().updated, 1);
        assert_eq!(store.get_guest(guest.id).unwrap().unwrap().segment, Segment::Vip);
    }
}
