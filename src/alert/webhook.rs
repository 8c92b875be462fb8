// src/alert/webhook.rs
// Webhook alert subscriber: posts each notification as JSON with a bounded
// timeout and capped retries. At-least-once, failures end up in logs only.

use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use super::AlertNotification;

#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub async fn send(&self, note: &AlertNotification) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(note)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(anyhow!("alert webhook HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(anyhow!("alert webhook request failed: {e}"));
                }
            }
        }
    }
}

/// Bridge the dispatcher's broadcast channel to the webhook. Runs until the
/// channel closes. A lagged receiver skips the dropped notifications and
/// keeps going; delivery failures are logged and never propagate.
pub fn spawn_forwarder(
    mut rx: broadcast::Receiver<AlertNotification>,
    notifier: WebhookNotifier,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(note) => {
                    if let Err(e) = notifier.send(&note).await {
                        warn!(error = %e, alert = note.alert_id, "alert delivery failed");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "alert subscriber lagged; notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
