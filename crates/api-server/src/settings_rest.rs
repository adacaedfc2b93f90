//! Settings REST API: key-value flags, webhook URLs and segment thresholds.

use crate::rest::{ApiResult, AppState};
use axum::extract::State;
use axum::Json;
use crm_core::repository::SettingsRepository;
use crm_core::settings::{
    format_flag, parse_flag, AUTO_BACKUP, BROADCAST_WEBHOOK_URL, PUSH_NOTIFICATIONS, WEBHOOK_URL,
};
use crm_core::{CrmError, CrmResult};
use crm_segmentation::{ReconcileReport, ThresholdSource};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub push_notifications: bool,
    pub webhook_url: String,
    pub broadcast_webhook_url: String,
    pub auto_backup: bool,
    pub segment_regular_threshold: u32,
    pub segment_vip_threshold: u32,
}

#[derive(Debug, Serialize)]
pub struct UpdateSettingsResponse {
    #[serde(flatten)]
    pub settings: SettingsResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconcileReport>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub push_notifications: Option<bool>,
    pub webhook_url: Option<String>,
    pub broadcast_webhook_url: Option<String>,
    pub auto_backup: Option<bool>,
    pub segment_regular_threshold: Option<i64>,
    pub segment_vip_threshold: Option<i64>,
}

/// Stored string setting, trimmed; empty when missing.
pub(crate) fn read_setting(state: &AppState, key: &str) -> CrmResult<String> {
    Ok(state
        .store
        .get_setting(key)?
        .map(|v| v.trim().to_string())
        .unwrap_or_default())
}

fn load_settings(state: &AppState) -> CrmResult<SettingsResponse> {
    let thresholds = state.thresholds.thresholds()?;
    Ok(SettingsResponse {
        push_notifications: parse_flag(state.store.get_setting(PUSH_NOTIFICATIONS)?.as_deref()),
        webhook_url: read_setting(state, WEBHOOK_URL)?,
        broadcast_webhook_url: read_setting(state, BROADCAST_WEBHOOK_URL)?,
        auto_backup: parse_flag(state.store.get_setting(AUTO_BACKUP)?.as_deref()),
        segment_regular_threshold: thresholds.regular(),
        segment_vip_threshold: thresholds.vip(),
    })
}

/// Empty, or an absolute http(s) URL.
fn validate_webhook_url(field: &str, raw: &str) -> CrmResult<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(String::new());
    }
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(raw.to_string()),
        _ => Err(CrmError::validation(format!(
            "{field} must be an absolute http(s) URL"
        ))),
    }
}

fn clamp_threshold(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<SettingsResponse>> {
    Ok(Json(load_settings(&state)?))
}

/// PATCH /api/settings: Update any subset. A threshold change may trigger reconciliation.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<UpdateSettingsResponse>> {
    // Validate everything before writing anything.
    let webhook_url = request
        .webhook_url
        .as_deref()
        .map(|u| validate_webhook_url("webhookUrl", u))
        .transpose()?;
    let broadcast_webhook_url = request
        .broadcast_webhook_url
        .as_deref()
        .map(|u| validate_webhook_url("broadcastWebhookUrl", u))
        .transpose()?;

    if let Some(flag) = request.push_notifications {
        state.store.put_setting(PUSH_NOTIFICATIONS, format_flag(flag))?;
    }
    if let Some(flag) = request.auto_backup {
        state.store.put_setting(AUTO_BACKUP, format_flag(flag))?;
    }
    if let Some(url) = webhook_url {
        state.store.put_setting(WEBHOOK_URL, &url)?;
    }
    if let Some(url) = broadcast_webhook_url {
        state.store.put_setting(BROADCAST_WEBHOOK_URL, &url)?;
    }

    let mut reconciliation = None;
    if request.segment_regular_threshold.is_some() || request.segment_vip_threshold.is_some() {
        state.thresholds.update(
            request.segment_regular_threshold.map(clamp_threshold),
            request.segment_vip_threshold.map(clamp_threshold),
        )?;
        if state.config.segmentation.reconcile_on_threshold_change {
            reconciliation = Some(state.reconciler.reconcile_all()?);
        }
    }

    let settings = load_settings(&state)?;
    info!(
        regular = settings.segment_regular_threshold,
        vip = settings.segment_vip_threshold,
        reconciled = reconciliation.is_some(),
        "Settings updated"
    );
    Ok(Json(UpdateSettingsResponse {
        settings,
        reconciliation,
    }))
}
