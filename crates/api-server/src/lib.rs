#![warn(clippy::unwrap_used)]

pub mod bookings_rest;
pub mod broadcasts_rest;
pub mod dashboard_rest;
pub mod guests_rest;
pub mod rest;
pub mod segments_rest;
pub mod server;
pub mod settings_rest;

pub use rest::{ApiError, AppState};
pub use server::{router, ApiServer};
