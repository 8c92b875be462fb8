// src/pipeline.rs
// One ingestion run: Fetching → Classifying → Persisting → Aggregating →
// Alerting, one batch per run, items strictly in fetch order.
//
// Failure policy (matches the error taxonomy in error.rs):
//   - fetch errors abort the run, cursor untouched; the scheduler backs off
//   - classify errors isolate to the item, which is stored with Unknown
//   - persistence errors isolate to the item but hold the cursor back, so
//     the next run re-fetches the batch and the idempotent store absorbs
//     the replay

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::aggregate::SentimentCounters;
use crate::alert::AlertDispatcher;
use crate::classify::{Classifier, UrgentKeywords, Verdict};
use crate::connector::SourceConnector;
use crate::error::{ClassifyError, FetchError};
use crate::model::{FeedbackItem, RawItem, SentimentLabel, Source};
use crate::store::{CursorStore, ItemStore, UpsertOutcome};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pulse_ingest_runs_total", "Completed ingestion runs.");
        describe_counter!("pulse_items_fetched_total", "Raw items returned by connectors.");
        describe_counter!("pulse_items_inserted_total", "Items newly stored.");
        describe_counter!(
            "pulse_duplicates_total",
            "Items skipped because they were already stored."
        );
        describe_counter!(
            "pulse_classify_errors_total",
            "Items stored with an unknown label after classifier failure."
        );
        describe_counter!(
            "pulse_item_failures_total",
            "Items that failed persistence and held the cursor back."
        );
        describe_counter!("pulse_connector_errors_total", "Connector fetch failures.");
        describe_counter!("pulse_alerts_total", "Alerts raised, by severity.");
        describe_counter!(
            "pulse_sentiment_total",
            "Running sentiment counts by source and label."
        );
        describe_histogram!("pulse_fetch_ms", "Connector fetch latency in milliseconds.");
        describe_gauge!(
            "pulse_last_success_ts",
            "Unix ts of the last clean run, by source."
        );
    });
}

/// Normalize feed text: entity decode, tag strip, whitespace collapse.
/// Social feeds carry the same HTML noise as any syndicated content.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // Length cap: 1000 chars
    if out.chars().count() > 1000 {
        out = out.chars().take(1000).collect();
    }

    out
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineCfg {
    pub fetch_timeout: Duration,
    pub classify_timeout: Duration,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(15),
            classify_timeout: Duration::from_secs(10),
        }
    }
}

/// What one run did. Logged per tick and mirrored onto the metrics surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub filtered: usize,
    pub classify_errors: usize,
    pub item_failures: usize,
    pub alerts_raised: usize,
    pub cursor_advanced: bool,
}

enum ItemOutcome {
    Inserted { classify_failed: bool, alerted: bool },
    Duplicate,
    Filtered,
    Failed,
}

pub struct IngestionPipeline {
    connector: Arc<dyn SourceConnector>,
    classifier: Arc<dyn Classifier>,
    items: Arc<dyn ItemStore>,
    counters: Arc<SentimentCounters>,
    dispatcher: Arc<AlertDispatcher>,
    cursors: Arc<dyn CursorStore>,
    keywords: UrgentKeywords,
    cfg: PipelineCfg,
}

impl IngestionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connector: Arc<dyn SourceConnector>,
        classifier: Arc<dyn Classifier>,
        items: Arc<dyn ItemStore>,
        counters: Arc<SentimentCounters>,
        dispatcher: Arc<AlertDispatcher>,
        cursors: Arc<dyn CursorStore>,
        keywords: UrgentKeywords,
        cfg: PipelineCfg,
    ) -> Self {
        ensure_metrics_described();
        Self {
            connector,
            classifier,
            items,
            counters,
            dispatcher,
            cursors,
            keywords,
            cfg,
        }
    }

    pub fn source(&self) -> Source {
        self.connector.source()
    }

    pub fn connector(&self) -> &Arc<dyn SourceConnector> {
        &self.connector
    }

    /// Run one batch without a cancellation handle (tests, one-shot tools).
    pub async fn run_once(&self) -> Result<RunReport, FetchError> {
        let (_tx, rx) = watch::channel(false);
        self.run_batch(&rx).await
    }

    /// Run one batch, checking `shutdown` between items. A cancelled run
    /// leaves the cursor untouched; no item is ever half-applied.
    pub async fn run_batch(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<RunReport, FetchError> {
        let source = self.source();
        let cursor = self
            .cursors
            .load(source)
            .await
            .map_err(|e| FetchError::transient(e.0))?;

        let t0 = Instant::now();
        let page = match timeout(self.cfg.fetch_timeout, self.connector.fetch(&cursor)).await {
            Err(_) => {
                counter!("pulse_connector_errors_total", "source" => source.as_str()).increment(1);
                return Err(FetchError::transient(anyhow!(
                    "fetch timed out after {:?}",
                    self.cfg.fetch_timeout
                )));
            }
            Ok(Err(e)) => {
                counter!("pulse_connector_errors_total", "source" => source.as_str()).increment(1);
                return Err(e);
            }
            Ok(Ok(page)) => page,
        };
        histogram!("pulse_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let mut report = RunReport {
            fetched: page.items.len(),
            ..RunReport::default()
        };
        counter!("pulse_items_fetched_total", "source" => source.as_str())
            .increment(report.fetched as u64);

        let mut dirty = false;
        for raw in page.items {
            if *shutdown.borrow() {
                debug!(source = %source, "run cancelled between items");
                dirty = true;
                break;
            }
            match self.process_item(source, raw).await {
                ItemOutcome::Inserted {
                    classify_failed,
                    alerted,
                } => {
                    report.inserted += 1;
                    if classify_failed {
                        report.classify_errors += 1;
                    }
                    if alerted {
                        report.alerts_raised += 1;
                    }
                }
                ItemOutcome::Duplicate => report.duplicates += 1,
                ItemOutcome::Filtered => report.filtered += 1,
                ItemOutcome::Failed => {
                    report.item_failures += 1;
                    dirty = true;
                }
            }
        }

        if !dirty {
            match self.cursors.advance(source, page.next_cursor.clone()).await {
                Ok(()) => {
                    report.cursor_advanced = true;
                    gauge!("pulse_last_success_ts", "source" => source.as_str())
                        .set(chrono::Utc::now().timestamp() as f64);
                }
                Err(e) => {
                    // Held-back cursor is safe: next run re-fetches and the
                    // store dedupes.
                    warn!(source = %source, error = %e, "cursor advance failed");
                }
            }
        }

        counter!("pulse_ingest_runs_total", "source" => source.as_str()).increment(1);
        counter!("pulse_items_inserted_total", "source" => source.as_str())
            .increment(report.inserted as u64);
        counter!("pulse_duplicates_total", "source" => source.as_str())
            .increment(report.duplicates as u64);
        counter!("pulse_classify_errors_total", "source" => source.as_str())
            .increment(report.classify_errors as u64);
        counter!("pulse_item_failures_total", "source" => source.as_str())
            .increment(report.item_failures as u64);

        info!(
            source = %source,
            fetched = report.fetched,
            inserted = report.inserted,
            duplicates = report.duplicates,
            classify_errors = report.classify_errors,
            item_failures = report.item_failures,
            alerts = report.alerts_raised,
            cursor = %if report.cursor_advanced { "advanced" } else { "held" },
            "ingest run finished"
        );

        Ok(report)
    }

    /// The per-item unit: classify, upsert, count, evaluate. All four
    /// effects happen for an item or none do; the only partial case (stored
    /// but alert insert failed) is logged, and re-evaluation is pointless
    /// because the dedup would skip the item anyway.
    async fn process_item(&self, source: Source, raw: RawItem) -> ItemOutcome {
        let text = normalize_text(&raw.text);
        if text.is_empty() {
            return ItemOutcome::Filtered;
        }

        // Classify before touching any shared state; nothing is locked
        // across this await.
        let verdict = match timeout(self.cfg.classify_timeout, self.classifier.classify(&text))
            .await
        {
            Err(_) => Err(ClassifyError::msg(format!(
                "classification timed out after {:?}",
                self.cfg.classify_timeout
            ))),
            Ok(res) => res,
        };

        let (verdict, classify_failed) = match verdict {
            Ok(v) => (v, false),
            Err(e) => {
                warn!(source = %source, id = %raw.source_id, error = %e, "classification failed; storing unknown");
                (
                    Verdict {
                        label: SentimentLabel::Unknown,
                        confidence: 0.0,
                        urgent: false,
                    },
                    true,
                )
            }
        };

        // Keyword hit dominates the model verdict.
        let urgent = verdict.urgent || self.keywords.matches(&text);

        let item = FeedbackItem {
            source,
            source_id: raw.source_id,
            text,
            sentiment: verdict.label,
            confidence: verdict.confidence,
            urgent,
            created_at: raw.created_at,
            ingested_at: chrono::Utc::now(),
            cross_reference: raw.cross_reference,
        };

        match self.items.upsert_if_absent(item.clone()).await {
            Ok(UpsertOutcome::AlreadyExists) => ItemOutcome::Duplicate,
            Ok(UpsertOutcome::Inserted) => {
                if item.sentiment.is_known() {
                    self.counters.increment(source, item.sentiment);
                }
                let alerted = match self.dispatcher.evaluate(&item).await {
                    Ok(alert) => alert.is_some(),
                    Err(e) => {
                        warn!(source = %source, id = %item.source_id, error = %e, "alert persistence failed");
                        false
                    }
                };
                ItemOutcome::Inserted {
                    classify_failed,
                    alerted,
                }
            }
            Err(e) => {
                warn!(source = %source, id = %item.source_id, error = %e, "item persistence failed");
                ItemOutcome::Failed
            }
        }
    }

    /// Counter-consistency audit: compares the running counters with the
    /// store's labeled count. Drift is logged, never "fixed" by
    /// re-ingesting.
    pub async fn audit_counters(&self) -> bool {
        let source = self.source();
        let counted = self.counters.total(source);
        match self.items.count_labeled(source).await {
            Ok(stored) if stored == counted => true,
            Ok(stored) => {
                warn!(source = %source, counted, stored, "counter drift detected");
                false
            }
            Err(e) => {
                warn!(source = %source, error = %e, "counter audit read failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_tags_and_entities() {
        let s = "<b>Hello&nbsp;&nbsp;world</b> &ldquo;ok&rdquo;";
        assert_eq!(normalize_text(s), r#"Hello world "ok""#);
    }

    #[test]
    fn normalize_caps_length() {
        let s = "x".repeat(5000);
        assert_eq!(normalize_text(&s).chars().count(), 1000);
    }

    #[test]
    fn normalize_keeps_plain_text() {
        assert_eq!(normalize_text("Great keynote!"), "Great keynote!");
    }
}
