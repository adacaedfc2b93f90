//! Marketing broadcast endpoints: reachable audience, history and creation.

use crate::rest::{ApiError, ApiResult, AppState};
use crate::settings_rest::read_setting;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use crm_core::broadcast::{Broadcast, BroadcastAudience, BroadcastId, NewBroadcast};
use crm_core::guest::Guest;
use crm_core::repository::{BroadcastRepository, GuestRepository};
use crm_core::settings::{BROADCAST_WEBHOOK_URL, WEBHOOK_URL};
use crm_core::CrmResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

const DEFAULT_HISTORY_LIMIT: usize = 5;
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BroadcastStatsResponse {
    pub available: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastResponse {
    pub id: BroadcastId,
    pub name: String,
    pub message_text: String,
    pub image_url: Option<String>,
    pub audience: BroadcastAudience,
    pub recipients_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<Broadcast> for BroadcastResponse {
    fn from(b: Broadcast) -> Self {
        Self {
            id: b.id,
            name: b.name,
            message_text: b.message_text,
            image_url: b.image_url,
            audience: b.audience,
            recipients_count: b.recipient_ids.len(),
            created_at: b.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBroadcastRequest {
    pub segment: String,
    pub message_text: String,
    pub image_url: Option<String>,
}

/// Active, has a phone, not on the stop list. Ignores the broadcast exclusion flag.
fn messageable(guest: &Guest) -> bool {
    guest.is_active() && !guest.is_in_stop_list && !guest.phone.trim().is_empty()
}

fn recipient_payload(guest: &Guest) -> Value {
    json!({
        "id": guest.id,
        "phone": guest.phone,
        "name": guest.name.as_deref().map(str::trim).unwrap_or_default(),
        "last_visit_at": guest
            .last_visit_at
            .map(|at| at.format("%d.%m.%Y").to_string())
            .unwrap_or_default(),
    })
}

/// Broadcast webhook, falling back to the general webhook.
fn broadcast_webhook_url(state: &AppState) -> CrmResult<String> {
    let url = read_setting(state, BROADCAST_WEBHOOK_URL)?;
    if !url.is_empty() {
        return Ok(url);
    }
    read_setting(state, WEBHOOK_URL)
}

/// GET /api/broadcasts/stats
pub async fn broadcast_stats(
    State(state): State<AppState>,
) -> ApiResult<Json<BroadcastStatsResponse>> {
    let available = state
        .store
        .active_guests()?
        .iter()
        .filter(|g| messageable(g))
        .count() as u64;
    Ok(Json(BroadcastStatsResponse { available }))
}

/// GET /api/broadcasts/history: Most recent broadcasts first.
pub async fn broadcast_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<BroadcastResponse>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let history = state.store.list_broadcasts(limit)?;
    Ok(Json(history.into_iter().map(BroadcastResponse::from).collect()))
}

/// POST /api/broadcasts: Record a broadcast to a segment and hand it to the webhook.
pub async fn create_broadcast(
    State(state): State<AppState>,
    Json(request): Json<CreateBroadcastRequest>,
) -> ApiResult<(StatusCode, Json<BroadcastResponse>)> {
    let audience: BroadcastAudience = request.segment.parse().map_err(ApiError::bad_request)?;
    let message_text = request.message_text.trim().to_string();
    if message_text.is_empty() {
        return Err(ApiError::bad_request("messageText must not be empty"));
    }
    let image_url = request
        .image_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    let recipients: Vec<Guest> = state
        .store
        .active_guests()?
        .into_iter()
        .filter(|g| g.is_reachable() && audience.matches(g.segment))
        .collect();

    let broadcast = state.store.insert_broadcast(NewBroadcast {
        message_text: message_text.clone(),
        image_url: image_url.clone(),
        audience,
        recipient_ids: recipients.iter().map(|g| g.id).collect(),
    })?;
    metrics::counter!("api.broadcasts.created").increment(1);
    info!(
        broadcast_id = broadcast.id,
        audience = audience.display_name(),
        recipients = recipients.len(),
        "Broadcast created"
    );

    let guests: Vec<Value> = recipients.iter().map(recipient_payload).collect();
    let mut payload = json!({
        "broadcast_id": broadcast.id,
        "segment": request.segment,
        "messageText": message_text,
        "guests": guests,
    });
    if let (Some(url), Some(obj)) = (&image_url, payload.as_object_mut()) {
        obj.insert("imageUrl".to_string(), Value::String(url.clone()));
    }
    state
        .webhooks
        .dispatch(&broadcast_webhook_url(&state)?, payload);

    Ok((StatusCode::CREATED, Json(broadcast.into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crm_core::Segment;

    fn guest() -> Guest {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 18, 0, 0).unwrap();
        Guest {
            id: 3,
            phone: "+7900".to_string(),
            name: Some(" Anna ".to_string()),
            email: None,
            visits_count: 0,
            confirmed_bookings_count: 0,
            segment: Segment::New,
            last_visit_at: Some(now),
            is_in_stop_list: false,
            exclude_from_broadcasts: true,
            created_at: now,
            updated_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn test_recipient_payload_format() {
        let payload = recipient_payload(&guest());
        assert_eq!(payload["name"], "Anna");
        assert_eq!(payload["last_visit_at"], "02.05.2024");

        let mut g = guest();
        g.last_visit_at = None;
        g.name = None;
        let payload = recipient_payload(&g);
        assert_eq!(payload["name"], "");
        assert_eq!(payload["last_visit_at"], "");
    }

    #[test]
    fn test_excluded_guest_counts_as_available() {
        let g = guest();
        assert!(messageable(&g));
        assert!(!g.is_reachable());
    }
}
