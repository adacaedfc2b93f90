//! Marketing broadcast records.

use crate::guest::{GuestId, Segment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub type BroadcastId = i64;

/// Audience of a broadcast: everyone reachable, or one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "segment")]
pub enum BroadcastAudience {
    All,
    Segment(Segment),
}

impl BroadcastAudience {
    pub fn matches(&self, segment: Segment) -> bool {
        match self {
            BroadcastAudience::All => true,
            BroadcastAudience::Segment(s) => *s == segment,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BroadcastAudience::All => "All guests",
            BroadcastAudience::Segment(s) => s.label(),
        }
    }
}

impl FromStr for BroadcastAudience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(BroadcastAudience::All);
        }
        trimmed.parse::<Segment>().map(BroadcastAudience::Segment)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: BroadcastId,
    pub name: String,
    pub message_text: String,
    pub image_url: Option<String>,
    pub audience: BroadcastAudience,
    pub recipient_ids: Vec<GuestId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBroadcast {
    pub message_text: String,
    pub image_url: Option<String>,
    pub audience: BroadcastAudience,
    pub recipient_ids: Vec<GuestId>,
}
