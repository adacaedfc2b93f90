//! Segment thresholds: typed pair, stored-setting parsing and the injectable source.

use crm_core::config::SegmentationConfig;
use crm_core::repository::SettingsRepository;
use crm_core::settings::{SEGMENT_REGULAR_THRESHOLD, SEGMENT_VIP_THRESHOLD};
use crm_core::{CrmResult, CrmStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// A visit-count threshold pair with `vip > regular` always holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentThresholds {
    regular: u32,
    vip: u32,
}

impl SegmentThresholds {
    pub const DEFAULT_REGULAR: u32 = 5;
    pub const DEFAULT_VIP: u32 = 10;

    /// Build a pair, repairing `vip <= regular` to `vip = regular + 1`.
    /// `regular` is capped one below `u32::MAX` so the repair cannot overflow.
    pub fn new(regular: u32, vip: u32) -> Self {
        let regular = regular.min(u32::MAX - 1);
        let vip = if vip <= regular { regular + 1 } else { vip };
        Self { regular, vip }
    }

    pub fn regular(&self) -> u32 {
        self.regular
    }

    pub fn vip(&self) -> u32 {
        self.vip
    }

    /// Build a pair from raw stored setting values, falling back to `defaults`
    /// per value when missing, empty or non-numeric.
    pub fn from_stored(regular: Option<&str>, vip: Option<&str>, defaults: SegmentThresholds) -> Self {
        Self::new(
            parse_threshold(regular, defaults.regular),
            parse_threshold(vip, defaults.vip),
        )
    }
}

impl Default for SegmentThresholds {
    fn default() -> Self {
        Self::new(Self::DEFAULT_REGULAR, Self::DEFAULT_VIP)
    }
}

impl From<&SegmentationConfig> for SegmentThresholds {
    fn from(config: &SegmentationConfig) -> Self {
        Self::new(config.default_regular_threshold, config.default_vip_threshold)
    }
}

/// Parse one stored threshold. Negative numbers clamp to 0.
fn parse_threshold(raw: Option<&str>, default: u32) -> u32 {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return default;
    };
    match raw.parse::<i64>() {
        Ok(n) => n.clamp(0, u32::MAX as i64) as u32,
        Err(_) => default,
    }
}

// ─── Source ─────────────────────────────────────────────────────────────────

/// Provider of the current thresholds, injected into the recalculator and reconciler.
pub trait ThresholdSource: Send + Sync {
    fn thresholds(&self) -> CrmResult<SegmentThresholds>;
}

/// A fixed pair.
impl ThresholdSource for SegmentThresholds {
    fn thresholds(&self) -> CrmResult<SegmentThresholds> {
        Ok(*self)
    }
}

/// Thresholds read from the persisted key-value settings.
pub struct SettingsThresholds {
    store: Arc<dyn CrmStore>,
    defaults: SegmentThresholds,
}

impl SettingsThresholds {
    pub fn new(store: Arc<dyn CrmStore>, config: &SegmentationConfig) -> Self {
        let defaults = SegmentThresholds::from(config);
        info!(
            regular = defaults.regular(),
            vip = defaults.vip(),
            "Threshold defaults configured"
        );
        Self { store, defaults }
    }

    pub fn defaults(&self) -> SegmentThresholds {
        self.defaults
    }

    /// Persist a new pair. Omitted values keep their current effective value;
    /// an inconsistent result is repaired rather than rejected.
    /// Existing guests are not reclassified here.
    pub fn update(&self, regular: Option<u32>, vip: Option<u32>) -> CrmResult<SegmentThresholds> {
        let current = self.thresholds()?;
        let updated = SegmentThresholds::new(
            regular.unwrap_or(current.regular()),
            vip.unwrap_or(current.vip()),
        );
        self.store
            .put_setting(SEGMENT_REGULAR_THRESHOLD, &updated.regular().to_string())?;
        self.store
            .put_setting(SEGMENT_VIP_THRESHOLD, &updated.vip().to_string())?;
        info!(
            regular = updated.regular(),
            vip = updated.vip(),
            "Segment thresholds updated"
        );
        Ok(updated)
    }
}

impl ThresholdSource for SettingsThresholds {
    fn thresholds(&self) -> CrmResult<SegmentThresholds> {
        let regular = self.store.get_setting(SEGMENT_REGULAR_THRESHOLD)?;
        let vip = self.store.get_setting(SEGMENT_VIP_THRESHOLD)?;
        let thresholds =
            SegmentThresholds::from_stored(regular.as_deref(), vip.as_deref(), self.defaults);
        debug!(
            regular = thresholds.regular(),
            vip = thresholds.vip(),
            "Thresholds loaded"
        );
        Ok(thresholds)
    }
}
