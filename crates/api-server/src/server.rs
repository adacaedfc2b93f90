//! API server: HTTP router, bootstrap and Prometheus exporter.

use crate::rest::{self, AppState};
use crate::{
    bookings_rest, broadcasts_rest, dashboard_rest, guests_rest, segments_rest, settings_rest,
};
use axum::http::HeaderValue;
use axum::routing::{get, patch, post};
use axum::Router;
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Build the full REST router over `state`.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.api.cors_origins_list());

    Router::new()
        // Guests
        .route(
            "/api/guests",
            get(guests_rest::list_guests).post(guests_rest::create_guest),
        )
        .route("/api/guests/stats", get(guests_rest::guest_stats))
        .route(
            "/api/guests/:id",
            get(guests_rest::get_guest)
                .patch(guests_rest::update_guest)
                .delete(guests_rest::delete_guest),
        )
        .route("/api/guests/:id/visits", post(guests_rest::add_visit))
        // Bookings
        .route(
            "/api/bookings",
            get(bookings_rest::list_bookings).post(bookings_rest::create_booking),
        )
        .route("/api/bookings/:id", get(bookings_rest::get_booking))
        .route(
            "/api/bookings/:id/status",
            patch(bookings_rest::update_booking_status),
        )
        // Settings & segments
        .route(
            "/api/settings",
            get(settings_rest::get_settings).patch(settings_rest::update_settings),
        )
        .route(
            "/api/segments/reconcile",
            post(segments_rest::reconcile_segments),
        )
        .route("/api/segments/thresholds", get(segments_rest::get_thresholds))
        // Broadcasts
        .route(
            "/api/broadcasts",
            post(broadcasts_rest::create_broadcast),
        )
        .route("/api/broadcasts/stats", get(broadcasts_rest::broadcast_stats))
        .route(
            "/api/broadcasts/history",
            get(broadcasts_rest::broadcast_history),
        )
        // Dashboard
        .route("/api/dashboard/stats", get(dashboard_rest::dashboard_stats))
        .route(
            "/api/dashboard/visits-by-date",
            get(dashboard_rest::visits_by_date),
        )
        .route(
            "/api/dashboard/recent-activity",
            get(dashboard_rest::recent_activity),
        )
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Main API server.
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let api = &self.state.config.api;
        let addr = SocketAddr::new(api.host.parse()?, api.http_port);
        let app = router(self.state.clone());

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        let config = &self.state.config;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                config.api.host.parse()?,
                config.metrics.port,
            ))
            .install()?;

        info!(port = config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
