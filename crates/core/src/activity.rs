//! Activity journal: who-did-what entries for guests and bookings.

use crate::booking::{BookingId, BookingStatus};
use crate::guest::GuestId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub type ActivityId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    GuestCreated,
    BookingCreated,
    BookingStatusChanged,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::GuestCreated => "guest_created",
            ActivityAction::BookingCreated => "booking_created",
            ActivityAction::BookingStatusChanged => "booking_status_changed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Guest,
    Booking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: ActivityId,
    pub action: ActivityAction,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    /// One-line Russian description shown in the dashboard feed.
    pub fn summary(&self) -> String {
        let label = match self.action {
            ActivityAction::GuestCreated => "Добавлен гость".to_string(),
            ActivityAction::BookingCreated => "Создана бронь".to_string(),
            ActivityAction::BookingStatusChanged => match self.status_change() {
                Some((old, new)) => format!("Статус брони: {old} → {new}"),
                None => "Смена статуса брони".to_string(),
            },
        };
        match self.entity_type {
            EntityType::Booking => format!("{label} (бронь #{})", self.entity_id),
            EntityType::Guest => format!("{label} (гость #{})", self.entity_id),
        }
    }

    fn status_change(&self) -> Option<(&str, &str)> {
        let details = self.details.as_ref()?;
        Some((
            details.get("old_status")?.as_str()?,
            details.get("new_status")?.as_str()?,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub action: ActivityAction,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub details: Option<Value>,
}

impl NewActivity {
    pub fn guest_created(guest_id: GuestId) -> Self {
        Self {
            action: ActivityAction::GuestCreated,
            entity_type: EntityType::Guest,
            entity_id: guest_id,
            details: None,
        }
    }

    pub fn booking_created(booking_id: BookingId, guest_id: GuestId) -> Self {
        Self {
            action: ActivityAction::BookingCreated,
            entity_type: EntityType::Booking,
            entity_id: booking_id,
            details: Some(json!({ "guest_id": guest_id })),
        }
    }

    pub fn booking_status_changed(
        booking_id: BookingId,
        old: BookingStatus,
        new: BookingStatus,
    ) -> Self {
        Self {
            action: ActivityAction::BookingStatusChanged,
            entity_type: EntityType::Booking,
            entity_id: booking_id,
            details: Some(json!({
                "old_status": old.as_str(),
                "new_status": new.as_str(),
            })),
        }
    }
}
