//! Keys of the persisted key-value settings table.

pub const SEGMENT_REGULAR_THRESHOLD: &str = "segment_regular_threshold";
pub const SEGMENT_VIP_THRESHOLD: &str = "segment_vip_threshold";
pub const PUSH_NOTIFICATIONS: &str = "pushNotifications";
pub const WEBHOOK_URL: &str = "webhookUrl";
pub const BROADCAST_WEBHOOK_URL: &str = "broadcastWebhookUrl";
pub const AUTO_BACKUP: &str = "autoBackup";

/// Stored boolean flag: missing means enabled.
pub fn parse_flag(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
    }
}

pub fn format_flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
