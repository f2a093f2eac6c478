//! Port for operator notification delivery.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Notification;

/// Fire-and-forget destination for notifications.
///
/// Callers log delivery errors and carry on; a failing sink never fails a cycle.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> DomainResult<()>;
}
