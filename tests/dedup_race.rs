// tests/dedup_race.rs
// Two pollers racing over overlapping batches must never double-count an
// item or double-raise an alert. The item store's atomic insert is the only
// synchronization between them.

use std::sync::Arc;

use chrono::Utc;

use crowd_pulse::aggregate::SentimentCounters;
use crowd_pulse::alert::AlertDispatcher;
use crowd_pulse::classify::{HeuristicEscalator, LexiconClassifier, UrgentKeywords};
use crowd_pulse::connector::static_feed::StaticFeedConnector;
use crowd_pulse::model::{RawItem, Severity, Source};
use crowd_pulse::pipeline::{IngestionPipeline, PipelineCfg};
use crowd_pulse::store::{
    AlertStore, ItemStore, MemoryAlertStore, MemoryCursorStore, MemoryItemStore,
};

fn raw(id: &str, text: &str) -> RawItem {
    RawItem {
        source_id: id.to_string(),
        text: text.to_string(),
        created_at: Utc::now(),
        cross_reference: None,
    }
}

fn pipeline_for(
    connector: StaticFeedConnector,
    items: Arc<MemoryItemStore>,
    counters: Arc<SentimentCounters>,
    dispatcher: Arc<AlertDispatcher>,
) -> IngestionPipeline {
    IngestionPipeline::new(
        Arc::new(connector),
        Arc::new(LexiconClassifier::new()),
        items,
        counters,
        dispatcher,
        Arc::new(MemoryCursorStore::new()),
        UrgentKeywords::defaults(),
        PipelineCfg::default(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_concurrent_batches_count_each_item_once() {
    let items = Arc::new(MemoryItemStore::new());
    let counters = Arc::new(SentimentCounters::new());
    let alerts = Arc::new(MemoryAlertStore::new());
    let dispatcher = Arc::new(AlertDispatcher::new(
        Severity::High,
        alerts.clone(),
        Arc::new(HeuristicEscalator),
    ));

    // Both batches contain c5 (urgent) and c6; ids c1..c8 overall.
    let batch_a: Vec<RawItem> = vec![
        raw("c1", "great set"),
        raw("c2", "awful sound"),
        raw("c5", "emergency near the stage"),
        raw("c6", "good vibes"),
    ];
    let batch_b: Vec<RawItem> = vec![
        raw("c5", "emergency near the stage"),
        raw("c6", "good vibes"),
        raw("c7", "loved it"),
        raw("c8", "boring filler"),
    ];

    let p1 = pipeline_for(
        StaticFeedConnector::from_items(Source::YoutubeComment, batch_a),
        items.clone(),
        counters.clone(),
        dispatcher.clone(),
    );
    let p2 = pipeline_for(
        StaticFeedConnector::from_items(Source::YoutubeComment, batch_b),
        items.clone(),
        counters.clone(),
        dispatcher.clone(),
    );

    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { p1.run_once().await.unwrap() }),
        tokio::spawn(async move { p2.run_once().await.unwrap() }),
    );
    let (r1, r2) = (r1.unwrap(), r2.unwrap());

    // 6 distinct ids; the 2 overlapping ones insert exactly once each.
    assert_eq!(r1.inserted + r2.inserted, 6);
    assert_eq!(r1.duplicates + r2.duplicates, 2);
    assert_eq!(items.count_labeled(Source::YoutubeComment).await.unwrap(), 6);
    assert_eq!(counters.total(Source::YoutubeComment), 6);

    // The shared urgent item alerted exactly once across both pollers.
    let stored_alerts = alerts.list().await.unwrap();
    assert_eq!(stored_alerts.len(), 1);
    assert_eq!(stored_alerts[0].trigger.source_id, "c5");
}
