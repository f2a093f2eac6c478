//! Notification sinks beyond the SQLite store.

pub mod fanout;
pub mod webhook;

pub use fanout::FanoutNotificationSink;
pub use webhook::WebhookNotificationSink;
