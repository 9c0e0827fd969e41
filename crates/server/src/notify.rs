//! Best-effort `app_updated` notifications.
//!
//! Callers enqueue without waiting. A background task delivers each event
//! to the configured webhook, or logs it when there is none. Delivery
//! problems never reach the request that produced the event.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{NOTIFICATIONS_DROPPED, NOTIFICATIONS_FAILED};
use bundler_core::config::NotificationConfig;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppUpdated {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub app_id: String,
    pub user_id: String,
}

impl AppUpdated {
    pub fn new(app_id: &str, user_id: &str) -> Self {
        Self {
            kind: "app_updated",
            app_id: app_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// Sending half of the notification queue.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::Sender<AppUpdated>,
}

enum Sink {
    Webhook { client: reqwest::Client, url: String },
    Log,
}

impl Notifier {
    fn channel(capacity: usize) -> (Self, mpsc::Receiver<AppUpdated>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Create the queue and spawn its delivery task.
    pub fn spawn(config: &NotificationConfig) -> ApiResult<(Self, JoinHandle<()>)> {
        let sink = match &config.webhook_url {
            Some(url) => Sink::Webhook {
                client: reqwest::Client::builder()
                    .timeout(WEBHOOK_TIMEOUT)
                    .build()
                    .map_err(|e| {
                        ApiError::Config(format!("failed to build notification client: {e}"))
                    })?,
                url: url.clone(),
            },
            None => Sink::Log,
        };
        let (notifier, rx) = Self::channel(config.queue_capacity);
        let handle = tokio::spawn(deliver(rx, sink));
        Ok((notifier, handle))
    }

    /// Enqueue an `app_updated` event. Never blocks and never fails.
    pub fn app_updated(&self, app_id: &str, user_id: &str) {
        match self.tx.try_send(AppUpdated::new(app_id, user_id)) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                NOTIFICATIONS_DROPPED.inc();
                tracing::warn!(app_id = %event.app_id, "(Ignored) notification queue full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                NOTIFICATIONS_DROPPED.inc();
                tracing::warn!(app_id = %event.app_id, "(Ignored) notification worker stopped, dropping event");
            }
        }
    }
}

async fn deliver(mut rx: mpsc::Receiver<AppUpdated>, sink: Sink) {
    while let Some(event) = rx.recv().await {
        match &sink {
            Sink::Log => {
                tracing::info!(app_id = %event.app_id, user_id = %event.user_id, "app_updated");
            }
            Sink::Webhook { client, url } => {
                let result = client
                    .post(url)
                    .json(&event)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status);
                if let Err(e) = result {
                    NOTIFICATIONS_FAILED.inc();
                    tracing::warn!(app_id = %event.app_id, error = %e, "(Ignored) notification delivery failed");
                }
            }
        }
    }
    tracing::debug!("Notification queue closed");
}
