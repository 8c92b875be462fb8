//! crowd-pulse — Binary Entrypoint
//! Wires config, stores, classifier, dispatcher, and one scheduler loop per
//! configured feed, plus the operational `/metrics` endpoint.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crowd_pulse::aggregate::SentimentCounters;
use crowd_pulse::alert::webhook::{spawn_forwarder, WebhookNotifier};
use crowd_pulse::alert::AlertDispatcher;
use crowd_pulse::classify::{HeuristicEscalator, LexiconClassifier, UrgentKeywords};
use crowd_pulse::config::AppConfig;
use crowd_pulse::connector::static_feed::StaticFeedConnector;
use crowd_pulse::connector::SourceConnector;
use crowd_pulse::metrics::Metrics;
use crowd_pulse::pipeline::{IngestionPipeline, PipelineCfg};
use crowd_pulse::scheduler::{Scheduler, SchedulerCfg};
use crowd_pulse::store::{MemoryAlertStore, MemoryCursorStore, MemoryItemStore};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crowd_pulse=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Demo connectors scripted from `config/feeds/*.json`. Production replaces
/// this with the per-platform HTTP connectors behind the same trait.
fn load_feed_connectors(dir: &Path) -> Vec<Arc<dyn SourceConnector>> {
    let mut out: Vec<Arc<dyn SourceConnector>> = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| StaticFeedConnector::from_json(&raw))
        {
            Ok(c) => {
                info!(feed = %path.display(), source = %c.source(), "feed loaded");
                out.push(Arc::new(c));
            }
            Err(e) => warn!(feed = %path.display(), error = %e, "skipping unreadable feed"),
        }
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;

    // Operational endpoints.
    let metrics = Metrics::init();
    let addr = std::env::var("PULSE_METRICS_ADDR").unwrap_or_else(|_| "127.0.0.1:9100".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "metrics listening");
    let router = metrics.router();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            warn!(error = %e, "metrics server stopped");
        }
    });

    // Shared state across all connector workers.
    let items = Arc::new(MemoryItemStore::new());
    let cursors = Arc::new(MemoryCursorStore::new());
    let counters = Arc::new(SentimentCounters::new());
    let classifier = Arc::new(LexiconClassifier::new());
    let dispatcher = Arc::new(AlertDispatcher::new(
        cfg.alerts.severity_floor,
        Arc::new(MemoryAlertStore::new()),
        Arc::new(HeuristicEscalator),
    ));

    if let Some(url) = cfg.alerts.webhook_url.clone() {
        let notifier = WebhookNotifier::new(url)
            .with_timeout(cfg.alerts.webhook_timeout_secs)
            .with_retries(cfg.alerts.webhook_retries);
        spawn_forwarder(dispatcher.subscribe(), notifier);
        info!("alert webhook forwarder started");
    }

    let connectors = load_feed_connectors(Path::new("config/feeds"));
    if connectors.is_empty() {
        warn!("no feed connectors configured; pipeline is idle");
    }

    let keywords = UrgentKeywords::new(cfg.classifier.urgent_keywords.clone());
    let pipeline_cfg = PipelineCfg {
        fetch_timeout: cfg.fetch_timeout(),
        classify_timeout: cfg.classify_timeout(),
    };

    let mut scheduler = Scheduler::new(SchedulerCfg {
        fast_interval: Duration::from_secs(cfg.scheduler.fast_interval_secs),
        slow_interval: Duration::from_secs(cfg.scheduler.slow_interval_secs),
        jitter_frac: cfg.scheduler.jitter_frac,
        backoff_cap: Duration::from_secs(cfg.scheduler.backoff_cap_secs),
    });

    for connector in connectors {
        scheduler.spawn(IngestionPipeline::new(
            connector,
            classifier.clone(),
            items.clone(),
            counters.clone(),
            dispatcher.clone(),
            cursors.clone(),
            keywords.clone(),
            pipeline_cfg,
        ));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested; draining connector loops");
    scheduler.shutdown().await;
    Ok(())
}
