//! Outbound notifications for the CRM.

pub mod dispatcher;

pub use dispatcher::{WebhookDispatcher, WebhookJob};
