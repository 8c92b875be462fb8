// tests/scheduler_loops.rs
// Scheduler policy under virtual time: backoff after transient failures,
// permanent stop on fatal ones, independence of loops, clean shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crowd_pulse::aggregate::SentimentCounters;
use crowd_pulse::alert::AlertDispatcher;
use crowd_pulse::classify::{HeuristicEscalator, LexiconClassifier, UrgentKeywords};
use crowd_pulse::connector::static_feed::{ScriptedFetch, StaticFeedConnector};
use crowd_pulse::model::{RawItem, Severity, Source};
use crowd_pulse::pipeline::{IngestionPipeline, PipelineCfg};
use crowd_pulse::scheduler::{ConnectorHealth, Scheduler, SchedulerCfg};
use crowd_pulse::store::{ItemStore, MemoryAlertStore, MemoryCursorStore, MemoryItemStore};

fn raw(id: &str, text: &str) -> RawItem {
    RawItem {
        source_id: id.to_string(),
        text: text.to_string(),
        created_at: Utc::now(),
        cross_reference: None,
    }
}

fn pipeline_for(connector: StaticFeedConnector, items: Arc<MemoryItemStore>) -> IngestionPipeline {
    let dispatcher = Arc::new(AlertDispatcher::new(
        Severity::High,
        Arc::new(MemoryAlertStore::new()),
        Arc::new(HeuristicEscalator),
    ));
    IngestionPipeline::new(
        Arc::new(connector),
        Arc::new(LexiconClassifier::new()),
        items,
        Arc::new(SentimentCounters::new()),
        dispatcher,
        Arc::new(MemoryCursorStore::new()),
        UrgentKeywords::defaults(),
        PipelineCfg::default(),
    )
}

fn cfg_no_jitter() -> SchedulerCfg {
    SchedulerCfg {
        fast_interval: Duration::from_secs(30),
        slow_interval: Duration::from_secs(300),
        jitter_frac: 0.0,
        backoff_cap: Duration::from_secs(900),
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failure_backs_off_then_recovers() {
    let items = Arc::new(MemoryItemStore::new());
    let connector = StaticFeedConnector::new(
        Source::TwitterPost,
        vec![
            ScriptedFetch::Transient("rate limited".into()),
            ScriptedFetch::Page(vec![raw("t1", "nice one")]),
        ],
    );
    let mut scheduler = Scheduler::new(cfg_no_jitter());
    scheduler.spawn(pipeline_for(connector, items.clone()));

    // First run fires at t=30 and fails; the retry is pushed to t=90.
    tokio::time::sleep(Duration::from_secs(45)).await;
    match scheduler.health_of(Source::TwitterPost) {
        Some(ConnectorHealth::BackingOff { delay, .. }) => {
            assert_eq!(delay, Duration::from_secs(60));
        }
        other => panic!("expected BackingOff, got {other:?}"),
    }
    assert_eq!(items.count_labeled(Source::TwitterPost).await.unwrap(), 0);

    // t=75 is past the base interval but inside the backoff window.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(items.count_labeled(Source::TwitterPost).await.unwrap(), 0);

    // t=95: the backed-off retry has run and succeeded.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(items.count_labeled(Source::TwitterPost).await.unwrap(), 1);
    assert!(matches!(
        scheduler.health_of(Source::TwitterPost),
        Some(ConnectorHealth::Healthy { .. })
    ));

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn fatal_failure_stops_the_loop_for_good() {
    let items = Arc::new(MemoryItemStore::new());
    let connector = StaticFeedConnector::new(
        Source::InstagramPost,
        vec![
            ScriptedFetch::Fatal("401 unauthorized".into()),
            // Never reached: the loop is dead after the fatal error.
            ScriptedFetch::Page(vec![raw("p1", "fine")]),
        ],
    );
    let mut scheduler = Scheduler::new(cfg_no_jitter());
    scheduler.spawn(pipeline_for(connector, items.clone()));

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert!(matches!(
        scheduler.health_of(Source::InstagramPost),
        Some(ConnectorHealth::Failed { .. })
    ));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(items.count_labeled(Source::InstagramPost).await.unwrap(), 0);
    assert!(matches!(
        scheduler.health_of(Source::InstagramPost),
        Some(ConnectorHealth::Failed { .. })
    ));

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn one_failed_connector_never_blocks_another() {
    let items = Arc::new(MemoryItemStore::new());
    let broken = StaticFeedConnector::new(
        Source::TwitterPost,
        vec![ScriptedFetch::Fatal("token revoked".into())],
    );
    let healthy = StaticFeedConnector::new(
        Source::YoutubeComment,
        vec![ScriptedFetch::Page(vec![raw("y1", "great energy")])],
    );

    let mut scheduler = Scheduler::new(cfg_no_jitter());
    scheduler.spawn(pipeline_for(broken, items.clone()));
    scheduler.spawn(pipeline_for(healthy, items.clone()));

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert!(matches!(
        scheduler.health_of(Source::TwitterPost),
        Some(ConnectorHealth::Failed { .. })
    ));
    assert_eq!(items.count_labeled(Source::YoutubeComment).await.unwrap(), 1);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn slow_cadence_uses_the_slow_interval() {
    use crowd_pulse::connector::Cadence;

    let items = Arc::new(MemoryItemStore::new());
    let connector = StaticFeedConnector::new(
        Source::FormResponse,
        vec![ScriptedFetch::Page(vec![raw("r1", "all fine")])],
    )
    .with_cadence(Cadence::Slow);

    let mut scheduler = Scheduler::new(cfg_no_jitter());
    scheduler.spawn(pipeline_for(connector, items.clone()));

    // Well past the fast interval, not yet at the slow one.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(items.count_labeled(Source::FormResponse).await.unwrap(), 0);

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert_eq!(items.count_labeled(Source::FormResponse).await.unwrap(), 1);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_drains_idle_loops_promptly() {
    let items = Arc::new(MemoryItemStore::new());
    let connector = StaticFeedConnector::new(Source::TwitterComment, Vec::new());
    let mut scheduler = Scheduler::new(cfg_no_jitter());
    scheduler.spawn(pipeline_for(connector, items));

    tokio::time::sleep(Duration::from_secs(5)).await;
    // Must complete without waiting out the 30s sleep for real.
    tokio::time::timeout(Duration::from_secs(60), scheduler.shutdown())
        .await
        .expect("shutdown should not hang");
}
