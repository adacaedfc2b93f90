//! Guest segmentation: threshold store, classifier, per-guest metrics
//! recalculation and bulk reconciliation.

pub mod classifier;
pub mod recalculator;
pub mod reconciler;
pub mod thresholds;

pub use classifier::classify;
pub use recalculator::{GuestMetricsRecalculator, RecalcOutcome};
pub use reconciler::{ReconcileReport, SegmentReconciler};
pub use thresholds::{SegmentThresholds, SettingsThresholds, ThresholdSource};
