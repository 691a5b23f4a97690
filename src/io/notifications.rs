//! Typed channel for outbound check-in notifications
//!
//! Provides a non-blocking way for the surface to notify the presentation
//! layer. Uses a bounded mpsc channel to prevent unbounded memory growth.

use crate::domain::types::epoch_ms;
use crate::domain::CheckinNotification;
use crate::infra::Metrics;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Wire shape of a notification handed to the presentation layer
#[derive(Debug, Serialize)]
pub struct NotificationPayload<'a> {
    /// Site identifier
    pub site: &'a str,
    /// Timestamp (epoch ms)
    pub ts: u64,
    #[serde(flatten)]
    pub notification: &'a CheckinNotification,
}

impl<'a> NotificationPayload<'a> {
    pub fn new(site: &'a str, notification: &'a CheckinNotification) -> Self {
        Self { site, ts: epoch_ms(), notification }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"site":"{}","t":"serialize_error","error":"{}"}}"#, self.site, e)
        })
    }
}

/// Sender handle for notifications
///
/// Non-blocking - if the channel is full, notifications are dropped and counted.
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<CheckinNotification>,
    metrics: Option<Arc<Metrics>>,
}

impl NotificationSender {
    pub fn new(tx: mpsc::Sender<CheckinNotification>) -> Self {
        Self { tx, metrics: None }
    }

    /// Count dropped notifications in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn send(&self, notification: CheckinNotification) {
        if let Err(e) = self.tx.try_send(notification) {
            if let Some(ref metrics) = self.metrics {
                metrics.record_notification_dropped();
            }
            let kind = match e {
                mpsc::error::TrySendError::Full(_) => "full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            };
            warn!(reason = %kind, "notification_dropped");
        }
    }
}

/// Create a new notification channel pair
pub fn create_notification_channel(
    buffer_size: usize,
) -> (NotificationSender, mpsc::Receiver<CheckinNotification>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (NotificationSender::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MemberId;

    #[test]
    fn test_send_and_drop_when_full() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_notification_channel(1);
        let sender = sender.with_metrics(metrics.clone());

        sender.send(CheckinNotification::Idle);
        sender.send(CheckinNotification::Accumulating { len: 1 });

        assert_eq!(rx.try_recv().unwrap(), CheckinNotification::Idle);
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.report().notifications_dropped, 1);
    }

    #[test]
    fn test_payload_json() {
        let notification = CheckinNotification::Navigate { member_id: MemberId(12) };
        let json = NotificationPayload::new("front-desk", &notification).to_json();
        assert!(json.starts_with(r#"{"site":"front-desk","ts":"#));
        assert!(json.contains(r#""t":"navigate""#));
        assert!(json.contains(r#""member_id":12"#));
    }
}
