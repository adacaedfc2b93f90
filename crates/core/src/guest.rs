//! Guest domain types - lifecycle segment, counters, visits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type GuestId = i64;
pub type VisitId = i64;

// ─── Segment ────────────────────────────────────────────────────────────────

/// Engagement segment derived from a guest's visit count.
/// Ordered: `New < Regular < Vip`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    New,
    Regular,
    #[serde(rename = "VIP")]
    Vip,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::New, Segment::Regular, Segment::Vip];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::New => "New",
            Segment::Regular => "Regular",
            Segment::Vip => "VIP",
        }
    }

    /// Russian label used by the front-office UI.
    pub fn localized_label(&self) -> &'static str {
        match self {
            Segment::New => "Новичок",
            Segment::Regular => "Постоянный",
            Segment::Vip => "VIP",
        }
    }
}

impl Default for Segment {
    fn default() -> Self {
        Segment::New
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Accepts English and localized labels, singular or plural, case-insensitive.
impl FromStr for Segment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" | "новичок" | "новички" => Ok(Segment::New),
            "regular" | "постоянный" | "постоянные" => Ok(Segment::Regular),
            "vip" => Ok(Segment::Vip),
            other => Err(format!("unknown segment '{other}'")),
        }
    }
}

// ─── Guest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub id: GuestId,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Number of recorded visits.
    pub visits_count: u32,
    /// Number of bookings currently in `confirmed` status.
    pub confirmed_bookings_count: u32,
    pub segment: Segment,
    pub last_visit_at: Option<DateTime<Utc>>,
    pub is_in_stop_list: bool,
    pub exclude_from_broadcasts: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Guest {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Whether a marketing broadcast may be sent to this guest at all.
    pub fn is_reachable(&self) -> bool {
        self.is_active()
            && !self.is_in_stop_list
            && !self.exclude_from_broadcasts
            && !self.phone.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewGuest {
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Profile fields editable by staff. `None` leaves a field unchanged;
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct GuestProfileUpdate {
    pub phone: Option<String>,
    pub name: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub is_in_stop_list: Option<bool>,
    pub exclude_from_broadcasts: Option<bool>,
}

/// Field-level patch of the derived guest metrics. Only fields that are
/// `Some` are written; `last_visit_at: Some(None)` clears the timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuestMetricsPatch {
    pub visits_count: Option<u32>,
    pub confirmed_bookings_count: Option<u32>,
    pub segment: Option<Segment>,
    pub last_visit_at: Option<Option<DateTime<Utc>>>,
    /// Moves `last_visit_at` forward to this instant, never back.
    /// Applied after `last_visit_at`, against the stored value.
    pub advance_last_visit_to: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl GuestMetricsPatch {
    pub fn apply(&self, guest: &mut Guest) {
        if let Some(v) = self.visits_count {
            guest.visits_count = v;
        }
        if let Some(c) = self.confirmed_bookings_count {
            guest.confirmed_bookings_count = c;
        }
        if let Some(s) = self.segment {
            guest.segment = s;
        }
        if let Some(at) = self.last_visit_at {
            guest.last_visit_at = at;
        }
        if let Some(at) = self.advance_last_visit_to {
            guest.last_visit_at = Some(guest.last_visit_at.map_or(at, |current| current.max(at)));
        }
        if let Some(at) = self.updated_at {
            guest.updated_at = Some(at);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GuestQuery {
    /// Case-insensitive substring match on name or phone.
    pub search: Option<String>,
}

// ─── Visit ──────────────────────────────────────────────────────────────────

/// An explicit arrival record, distinct from a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: VisitId,
    pub guest_id: GuestId,
    pub booking_id: Option<i64>,
    pub arrived_at: DateTime<Utc>,
    pub revenue: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVisit {
    pub guest_id: GuestId,
    pub booking_id: Option<i64>,
    pub arrived_at: DateTime<Utc>,
    pub revenue: Option<f64>,
    pub notes: Option<String>,
}

/// Count of visit records and newest arrival for one guest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitSummary {
    pub count: u32,
    pub last_arrived_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_ordering() {
        assert!(Segment::New < Segment::Regular);
        assert!(Segment::Regular < Segment::Vip);
    }

    #[test]
    fn test_segment_parse_labels() {
        assert_eq!("VIP".parse::<Segment>().unwrap(), Segment::Vip);
        assert_eq!("regular".parse::<Segment>().unwrap(), Segment::Regular);
        assert_eq!("Новички".parse::<Segment>().unwrap(), Segment::New);
        assert_eq!("Постоянный".parse::<Segment>().unwrap(), Segment::Regular);
        assert!("gold".parse::<Segment>().is_err());
    }

    #[test]
    fn test_segment_serde_label() {
        assert_eq!(serde_json::to_string(&Segment::Vip).unwrap(), "\"VIP\"");
        assert_eq!(serde_json::to_string(&Segment::New).unwrap(), "\"New\"");
    }

    #[test]
    fn test_metrics_patch_only_touches_present_fields() {
        let now = Utc::now();
        let mut guest = Guest {
            id: 1,
            phone: "+100".to_string(),
            name: None,
            email: None,
            visits_count: 7,
            confirmed_bookings_count: 1,
            segment: Segment::Regular,
            last_visit_at: Some(now),
            is_in_stop_list: false,
            exclude_from_broadcasts: false,
            created_at: now,
            updated_at: None,
            deleted_at: None,
        };
        let patch = GuestMetricsPatch {
            confirmed_bookings_count: Some(3),
            ..Default::default()
        };
        patch.apply(&mut guest);
        assert_eq!(guest.confirmed_bookings_count, 3);
        assert_eq!(guest.visits_count, 7);
        assert_eq!(guest.segment, Segment::Regular);
        assert_eq!(guest.last_visit_at, Some(now));

        GuestMetricsPatch {
            last_visit_at: Some(None),
            ..Default::default()
        }
        .apply(&mut guest);
        assert!(guest.last_visit_at.is_none());
    }

    #[test]
    fn test_advance_last_visit_only_moves_forward() {
        let now = Utc::now();
        let mut guest = Guest {
            id: 1,
            phone: "+100".to_string(),
            name: None,
            email: None,
            visits_count: 0,
            confirmed_bookings_count: 0,
            segment: Segment::New,
            last_visit_at: None,
            is_in_stop_list: false,
            exclude_from_broadcasts: false,
            created_at: now,
            updated_at: None,
            deleted_at: None,
        };
        let advance = |to| GuestMetricsPatch {
            advance_last_visit_to: Some(to),
            ..Default::default()
        };

        advance(now).apply(&mut guest);
        assert_eq!(guest.last_visit_at, Some(now));
        advance(now - chrono::Duration::days(3)).apply(&mut guest);
        assert_eq!(guest.last_visit_at, Some(now));
        advance(now + chrono::Duration::hours(1)).apply(&mut guest);
        assert_eq!(guest.last_visit_at, Some(now + chrono::Duration::hours(1)));
    }
}
