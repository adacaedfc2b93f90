//! Booking domain types.

use crate::guest::GuestId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type BookingId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Canceled,
    NoShow,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Canceled,
        BookingStatus::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Canceled => "canceled",
            BookingStatus::NoShow => "no_show",
        }
    }

    /// Statuses that close a booking out (used for the no-show rate).
    pub fn is_resolved(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

impl Default for BookingStatus {
    fn default() -> Self {
        BookingStatus::Pending
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = BookingStatus::ALL.iter().map(|s| s.as_str()).collect();
                format!("status must be one of: {}", allowed.join(", "))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub guest_id: GuestId,
    pub booking_time: DateTime<Utc>,
    pub party_size: u32,
    pub status: BookingStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub guest_id: GuestId,
    pub booking_time: DateTime<Utc>,
    pub party_size: u32,
}

#[derive(Debug, Clone, Default)]
pub struct BookingQuery {
    /// Case-insensitive substring match on the guest's name or phone.
    pub search: Option<String>,
    /// Restrict to bookings on this UTC day.
    pub day: Option<NaiveDate>,
}

/// Count of confirmed bookings and newest confirmed `booking_time` for one guest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmedSummary {
    pub count: u32,
    pub last_booking_time: Option<DateTime<Utc>>,
}

/// Booking totals per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BookingStatusCounts {
    pub pending: u64,
    pub confirmed: u64,
    pub canceled: u64,
    pub no_show: u64,
}

impl BookingStatusCounts {
    pub fn add(&mut self, status: BookingStatus) {
        match status {
            BookingStatus::Pending => self.pending += 1,
            BookingStatus::Confirmed => self.confirmed += 1,
            BookingStatus::Canceled => self.canceled += 1,
            BookingStatus::NoShow => self.no_show += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.confirmed + self.canceled + self.no_show
    }

    /// Share of no-shows among resolved bookings, in percent, one decimal.
    pub fn no_show_rate(&self) -> f64 {
        let resolved = self.confirmed + self.canceled + self.no_show;
        if resolved == 0 {
            return 0.0;
        }
        (self.no_show as f64 / resolved as f64 * 1000.0).round() / 10.0
    }
}
