//! Broadcast a notification to several sinks.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Notification;
use crate::domain::ports::NotificationSink;

/// Delivers to every inner sink, even when some of them fail.
#[derive(Clone, Default)]
pub struct FanoutNotificationSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for FanoutNotificationSink {
    async fn send(&self, notification: &Notification) -> DomainResult<()> {
        let results = futures::future::join_all(self.sinks.iter().map(|sink| sink.send(notification))).await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err())
            .map(|e| e.to_string())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DomainError::NotificationFailed(failures.join("; ")))
        }
    }
}
