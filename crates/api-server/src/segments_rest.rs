//! Segment maintenance endpoints.

use crate::rest::{ApiResult, AppState};
use axum::extract::State;
use axum::Json;
use crm_segmentation::{ReconcileReport, SegmentThresholds, ThresholdSource};

/// POST /api/segments/reconcile: Reclassify every active guest.
pub async fn reconcile_segments(
    State(state): State<AppState>,
) -> ApiResult<Json<ReconcileReport>> {
    let report = state.reconciler.reconcile_all()?;
    metrics::counter!("api.segments.reconcile").increment(1);
    Ok(Json(report))
}

/// GET /api/segments/thresholds: Effective (repaired) thresholds.
pub async fn get_thresholds(State(state): State<AppState>) -> ApiResult<Json<SegmentThresholds>> {
    Ok(Json(state.thresholds.thresholds()?))
}
