//! Guest metrics recalculation after booking status changes and visit additions.
//!
//! Bookings only drive `confirmed_bookings_count` (and `last_visit_at` when at
//! least one booking is confirmed, never earlier than the newest recorded
//! visit). `visits_count` and `segment` are driven by explicit visit records
//! and by the bulk reconciler.

use crate::thresholds::ThresholdSource;
use chrono::{DateTime, Utc};
use crm_core::guest::{Guest, GuestId, GuestMetricsPatch};
use crm_core::repository::{BookingRepository, GuestRepository, VisitRepository};
use crm_core::{CrmResult, CrmStore};
use std::sync::Arc;
use tracing::debug;

/// Result of one recalculation.
#[derive(Debug, Clone, PartialEq)]
pub enum RecalcOutcome {
    /// The guest record after the patch was committed.
    Updated(Guest),
    /// The guest vanished between the trigger and the recalculation.
    GuestMissing,
}

impl RecalcOutcome {
    pub fn into_guest(self) -> Option<Guest> {
        match self {
            RecalcOutcome::Updated(guest) => Some(guest),
            RecalcOutcome::GuestMissing => None,
        }
    }
}

pub struct GuestMetricsRecalculator {
    store: Arc<dyn CrmStore>,
    thresholds: Arc<dyn ThresholdSource>,
}

impl GuestMetricsRecalculator {
    pub fn new(store: Arc<dyn CrmStore>, thresholds: Arc<dyn ThresholdSource>) -> Self {
        Self { store, thresholds }
    }

    /// Recount confirmed bookings for a guest. Must run after the status write
    /// that triggered it has been committed.
    pub fn recalculate_from_bookings(&self, guest_id: GuestId) -> CrmResult<RecalcOutcome> {
        self.recalculate_from_bookings_at(guest_id, Utc::now())
    }

    /// Same as [`recalculate_from_bookings`](Self::recalculate_from_bookings)
    /// with an explicit `updated_at`.
    pub fn recalculate_from_bookings_at(
        &self,
        guest_id: GuestId,
        now: DateTime<Utc>,
    ) -> CrmResult<RecalcOutcome> {
        metrics::counter!("segmentation.recalculations", "source" => "bookings").increment(1);

        if self.store.get_guest(guest_id)?.is_none() {
            return Ok(self.missing(guest_id));
        }

        let summary = self.store.confirmed_summary(guest_id)?;
        // Recomputed from both sources so a cancellation can move a
        // booking-driven timestamp back without losing a later visit.
        let last_visit_at = match summary.last_booking_time {
            Some(booked) => {
                let visits = self.store.visit_summary(guest_id)?;
                Some(Some(
                    visits
                        .last_arrived_at
                        .map_or(booked, |arrived| arrived.max(booked)),
                ))
            }
            None => None,
        };
        let patch = GuestMetricsPatch {
            confirmed_bookings_count: Some(summary.count),
            last_visit_at,
            updated_at: Some(now),
            ..Default::default()
        };

        debug!(
            guest_id,
            confirmed = summary.count,
            last_booking = ?summary.last_booking_time,
            "Recalculated guest from bookings"
        );
        self.commit(guest_id, &patch)
    }

    /// Recount visit records for a guest and reclassify its segment against
    /// the current thresholds.
    pub fn recalculate_from_visits(&self, guest_id: GuestId) -> CrmResult<RecalcOutcome> {
        self.recalculate_from_visits_at(guest_id, Utc::now())
    }

    pub fn recalculate_from_visits_at(
        &self,
        guest_id: GuestId,
        now: DateTime<Utc>,
    ) -> CrmResult<RecalcOutcome> {
        metrics::counter!("segmentation.recalculations", "source" => "visits").increment(1);

        let Some(guest) = self.store.get_guest(guest_id)? else {
            return Ok(self.missing(guest_id));
        };

        let thresholds = self.thresholds.thresholds()?;
        let summary = self.store.visit_summary(guest_id)?;
        let segment = thresholds.classify(summary.count);

        if segment != guest.segment {
            metrics::counter!("segmentation.segment_changes").increment(1);
            debug!(
                guest_id,
                old = %guest.segment,
                new = %segment,
                "Guest segment changed"
            );
        }

        let patch = GuestMetricsPatch {
            visits_count: Some(summary.count),
            segment: Some(segment),
            advance_last_visit_to: summary.last_arrived_at,
            updated_at: Some(now),
            ..Default::default()
        };

        debug!(
            guest_id,
            visits = summary.count,
            segment = %segment,
            "Recalculated guest from visits"
        );
        self.commit(guest_id, &patch)
    }

    fn commit(&self, guest_id: GuestId, patch: &GuestMetricsPatch) -> CrmResult<RecalcOutcome> {
        if !self.store.patch_guest_metrics(guest_id, patch)? {
            return Ok(self.missing(guest_id));
        }
        Ok(match self.store.get_guest(guest_id)? {
            Some(guest) => RecalcOutcome::Updated(guest),
            None => self.missing(guest_id),
        })
    }

    fn missing(&self, guest_id: GuestId) -> RecalcOutcome {
        metrics::counter!("segmentation.recalc_guest_missing").increment(1);
        debug!(guest_id, "Guest missing during recalculation, skipping");
        RecalcOutcome::GuestMissing
    }
}
