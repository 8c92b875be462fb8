// src/scheduler.rs
// One owned, persistent loop per connector. Loops are fully independent:
// a stalled or failed connector never delays another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::connector::Cadence;
use crate::model::Source;
use crate::pipeline::IngestionPipeline;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerCfg {
    /// Base interval for `Cadence::Fast` connectors.
    pub fast_interval: Duration,
    /// Base interval for `Cadence::Slow` connectors.
    pub slow_interval: Duration,
    /// Uniform jitter applied to every sleep, as a fraction of the delay.
    pub jitter_frac: f64,
    /// Upper bound for exponential backoff after transient fetch errors.
    pub backoff_cap: Duration,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_secs(30),
            slow_interval: Duration::from_secs(300),
            jitter_frac: 0.10,
            backoff_cap: Duration::from_secs(900),
        }
    }
}

/// Operator-visible state of one connector loop. `Failed` is terminal until
/// the process is reconfigured and restarted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorHealth {
    Idle,
    Healthy { last_success: DateTime<Utc> },
    BackingOff { delay: Duration, error: String },
    Failed { error: String },
}

type HealthMap = Arc<Mutex<HashMap<Source, ConnectorHealth>>>;

pub struct Scheduler {
    cfg: SchedulerCfg,
    shutdown_tx: watch::Sender<bool>,
    health: HealthMap,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(cfg: SchedulerCfg) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            cfg,
            shutdown_tx,
            health: Arc::new(Mutex::new(HashMap::new())),
            handles: Vec::new(),
        }
    }

    /// Spawn the polling loop for one connector.
    pub fn spawn(&mut self, pipeline: IngestionPipeline) {
        let source = pipeline.source();
        let base = match pipeline.connector().cadence() {
            Cadence::Fast => self.cfg.fast_interval,
            Cadence::Slow => self.cfg.slow_interval,
        };
        set_health(&self.health, source, ConnectorHealth::Idle);

        let cfg = self.cfg;
        let health = Arc::clone(&self.health);
        let shutdown_rx = self.shutdown_tx.subscribe();
        info!(source = %source, interval_secs = base.as_secs(), "connector loop starting");
        self.handles
            .push(tokio::spawn(run_loop(pipeline, base, cfg, shutdown_rx, health)));
    }

    pub fn health_of(&self, source: Source) -> Option<ConnectorHealth> {
        self.health
            .lock()
            .expect("health mutex poisoned")
            .get(&source)
            .cloned()
    }

    pub fn health_snapshot(&self) -> HashMap<Source, ConnectorHealth> {
        self.health.lock().expect("health mutex poisoned").clone()
    }

    /// Signal every loop to stop and wait for them to drain. In-flight runs
    /// notice the flag between items and stop without advancing cursors.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for h in self.handles {
            let _ = h.await;
        }
    }
}

async fn run_loop(
    pipeline: IngestionPipeline,
    base: Duration,
    cfg: SchedulerCfg,
    mut shutdown_rx: watch::Receiver<bool>,
    health: HealthMap,
) {
    let source = pipeline.source();
    let mut delay = base;

    loop {
        let sleep_for = jittered(delay, cfg.jitter_frac);
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
        }
        if *shutdown_rx.borrow() {
            break;
        }

        match pipeline.run_batch(&shutdown_rx).await {
            Ok(_report) => {
                delay = base;
                set_health(
                    &health,
                    source,
                    ConnectorHealth::Healthy {
                        last_success: Utc::now(),
                    },
                );
            }
            Err(e) if e.is_fatal() => {
                error!(source = %source, error = %e, "connector failed permanently; loop stopped");
                set_health(
                    &health,
                    source,
                    ConnectorHealth::Failed {
                        error: e.to_string(),
                    },
                );
                break;
            }
            Err(e) => {
                delay = next_backoff(delay, cfg.backoff_cap);
                warn!(
                    source = %source,
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "transient fetch failure; backing off"
                );
                set_health(
                    &health,
                    source,
                    ConnectorHealth::BackingOff {
                        delay,
                        error: e.to_string(),
                    },
                );
            }
        }
    }
    info!(source = %source, "connector loop stopped");
}

fn set_health(health: &HealthMap, source: Source, state: ConnectorHealth) {
    health
        .lock()
        .expect("health mutex poisoned")
        .insert(source, state);
}

fn next_backoff(current: Duration, cap: Duration) -> Duration {
    (current * 2).min(cap)
}

fn jittered(d: Duration, frac: f64) -> Duration {
    if frac <= 0.0 {
        return d;
    }
    let f = rand::rng().random_range((1.0 - frac)..=(1.0 + frac));
    d.mul_f64(f)
}
