//! Webhook notification sink.
//!
//! POSTs each notification as JSON to an operator-configured URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Notification;
use crate::domain::ports::NotificationSink;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    id: String,
    cluster_id: &'a str,
    title: &'a str,
    message: &'a str,
    severity: &'a str,
    created_at: String,
}

impl<'a> From<&'a Notification> for WebhookPayload<'a> {
    fn from(n: &'a Notification) -> Self {
        Self {
            id: n.id.to_string(),
            cluster_id: &n.cluster_id,
            title: &n.title,
            message: &n.message,
            severity: n.severity.as_str(),
            created_at: n.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookNotificationSink {
    http: Client,
    url: String,
    timeout: Duration,
}

impl WebhookNotificationSink {
    /// Build a sink whose requests are bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> DomainResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("autoheal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DomainError::NotificationFailed(format!("failed to build webhook client: {e}")))?;

        Ok(Self { http, url: url.into(), timeout })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn send(&self, notification: &Notification) -> DomainResult<()> {
        let resp = self
            .http
            .post(&self.url)
            .json(&WebhookPayload::from(notification))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DomainError::Timeout {
                        operation: "webhook notification".to_string(),
                        after_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    DomainError::NotificationFailed(format!("webhook request failed: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DomainError::NotificationFailed(format!(
                "webhook returned {status}: {body}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::NotificationSeverity;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_posts_notification_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hooks/autoheal")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "clusterId": "cluster-a",
                "severity": "critical",
                "title": "Auto-heal run"
            })))
            .with_status(204)
            .create_async()
            .await;

        let sink = WebhookNotificationSink::new(
            format!("{}/hooks/autoheal", server.url()),
            Duration::from_secs(2),
        )
        .unwrap();
        let notification =
            Notification::new("cluster-a", "Auto-heal run", "1 exhausted", NotificationSeverity::Critical);

        sink.send(&notification).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .with_body("down")
            .create_async()
            .await;

        let sink = WebhookNotificationSink::new(server.url(), Duration::from_secs(2)).unwrap();
        let notification = Notification::new("cluster-a", "t", "m", NotificationSeverity::Info);

        let err = sink.send(&notification).await.unwrap_err();
        assert!(matches!(err, DomainError::NotificationFailed(msg) if msg.contains("500")));
    }
}
