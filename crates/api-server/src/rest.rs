//! Shared REST state, error mapping and operational endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use crm_core::activity::NewActivity;
use crm_core::repository::{ActivityRepository, SettingsRepository};
use crm_core::settings::WEBHOOK_URL;
use crm_core::{AppConfig, CrmError, CrmResult, CrmStore};
use crm_notify::WebhookDispatcher;
use crm_segmentation::{GuestMetricsRecalculator, SegmentReconciler, SettingsThresholds};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn CrmStore>,
    pub thresholds: Arc<SettingsThresholds>,
    pub recalculator: Arc<GuestMetricsRecalculator>,
    pub reconciler: Arc<SegmentReconciler>,
    pub webhooks: WebhookDispatcher,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the segmentation components over one store.
    pub fn new(config: AppConfig, store: Arc<dyn CrmStore>, webhooks: WebhookDispatcher) -> Self {
        let thresholds = Arc::new(SettingsThresholds::new(store.clone(), &config.segmentation));
        let recalculator = Arc::new(GuestMetricsRecalculator::new(
            store.clone(),
            thresholds.clone(),
        ));
        let reconciler = Arc::new(SegmentReconciler::new(store.clone(), thresholds.clone()));
        Self {
            config: Arc::new(config),
            store,
            thresholds,
            recalculator,
            reconciler,
            webhooks,
            start_time: Instant::now(),
        }
    }

    /// Append to the activity journal.
    pub(crate) fn journal(&self, activity: NewActivity) -> CrmResult<()> {
        metrics::counter!("api.activity.recorded", "action" => activity.action.as_str())
            .increment(1);
        let entry = self.store.record_activity(activity)?;
        debug!(
            activity_id = entry.id,
            action = entry.action.as_str(),
            entity_id = entry.entity_id,
            "Activity recorded"
        );
        Ok(())
    }
}

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler error: HTTP status plus JSON body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        metrics::counter!("api.validation_errors").increment(1);
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.body.message
    }
}

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::NotFound(msg) => Self::not_found(msg),
            CrmError::Conflict(msg) => Self::new(StatusCode::CONFLICT, "conflict", msg),
            CrmError::Validation(msg) => Self::bad_request(msg),
            other => {
                error!(error = %other, "Request failed");
                metrics::counter!("api.errors").increment(1);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal processing error",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ─── Probes ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub instance: String,
    pub uptime_secs: u64,
}

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        instance: state.config.instance_name.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: Readiness probe.
/// Ready once the settings table answers.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store.get_setting(WEBHOOK_URL) {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            error!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /live: Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
