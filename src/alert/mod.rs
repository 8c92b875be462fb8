// src/alert/mod.rs
// Severity gating, per-item debounce, persistence, and fan-out of alerts.

pub mod webhook;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::classify::{Escalation, SeverityEscalator};
use crate::error::PersistenceError;
use crate::model::{Alert, FeedbackItem, NewAlert, SentimentLabel, Severity};
use crate::store::AlertStore;

/// Payload published to alert subscribers. Delivery is at-least-once and
/// best-effort; subscribers never acknowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub alert_id: u64,
    pub severity: Severity,
    pub text: String,
    pub source_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub struct AlertDispatcher {
    floor: Severity,
    alerts: Arc<dyn AlertStore>,
    escalator: Arc<dyn SeverityEscalator>,
    tx: broadcast::Sender<AlertNotification>,
}

impl AlertDispatcher {
    pub fn new(
        floor: Severity,
        alerts: Arc<dyn AlertStore>,
        escalator: Arc<dyn SeverityEscalator>,
    ) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            floor,
            alerts,
            escalator,
            tx,
        }
    }

    /// New subscriber handle. Slow or absent subscribers never block the
    /// pipeline; a lagging receiver just drops the oldest notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertNotification> {
        self.tx.subscribe()
    }

    /// Decide whether `item` becomes an alert, and if so persist + publish.
    ///
    /// Gating: urgent items alert unconditionally (critical, safety);
    /// negative items alert when the escalator puts them at or above the
    /// configured floor. Everything else passes silently. At most one alert
    /// ever exists per trigger item: the upstream item dedup guarantees we
    /// see each item once, and the alert store's per-trigger uniqueness
    /// backstops that.
    pub async fn evaluate(&self, item: &FeedbackItem) -> Result<Option<Alert>, PersistenceError> {
        let escalation = if item.urgent {
            Some(Escalation {
                severity: Severity::Critical,
                category: "safety".to_string(),
            })
        } else if item.sentiment == SentimentLabel::Negative {
            match self.escalator.escalate(item).await {
                Ok(esc) if esc.severity >= self.floor => Some(esc),
                Ok(_) => None,
                Err(err) => {
                    // Escalation is advisory; a failed call means no alert,
                    // not a failed item.
                    warn!(error = %err, item = %item.key(), "severity escalation failed");
                    None
                }
            }
        } else {
            None
        };

        let Some(esc) = escalation else {
            return Ok(None);
        };

        let alert = NewAlert {
            trigger: item.key(),
            severity: esc.severity,
            category: esc.category,
            message: alert_message(item),
            source_url: item.cross_reference.clone(),
        };

        let Some(stored) = self.alerts.insert_if_absent(alert).await? else {
            return Ok(None);
        };

        counter!("pulse_alerts_total", "severity" => stored.severity.as_str()).increment(1);
        info!(
            alert = stored.id,
            severity = %stored.severity,
            category = %stored.category,
            item = %stored.trigger,
            "alert raised"
        );

        // Fire-and-forget: no receivers is not an error.
        let _ = self.tx.send(AlertNotification {
            alert_id: stored.id,
            severity: stored.severity,
            text: item.text.clone(),
            source_url: stored.source_url.clone(),
            timestamp: stored.created_at,
        });

        Ok(Some(stored))
    }
}

fn alert_message(item: &FeedbackItem) -> String {
    let mut excerpt: String = item.text.chars().take(140).collect();
    if excerpt.len() < item.text.len() {
        excerpt.push('…');
    }
    format!("Immediate attention required ({}): {}", item.source, excerpt)
}
