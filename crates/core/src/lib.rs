pub mod activity;
pub mod booking;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod guest;
pub mod pagination;
pub mod repository;
pub mod settings;

pub use config::AppConfig;
pub use error::{CrmError, CrmResult};
pub use guest::{Guest, GuestId, Segment};
pub use repository::CrmStore;
