// src/aggregate.rs
// Running sentiment counters, the dashboard's data source.
//
// Counters are keyed `(source, label)` and only ever incremented; the
// invariant `sum(counters for source) == stored items with a known label`
// holds because the pipeline increments exactly once per Inserted item.

use std::collections::HashMap;
use std::sync::Mutex;

use metrics::counter;

use crate::model::{SentimentLabel, Source};

#[derive(Default)]
pub struct SentimentCounters {
    inner: Mutex<HashMap<(Source, SentimentLabel), u64>>,
}

impl SentimentCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic add-one. `Unknown` is rejected by the caller (classification
    /// failures never count); debug builds assert it.
    pub fn increment(&self, source: Source, label: SentimentLabel) {
        debug_assert!(label.is_known(), "unknown labels are not counted");
        {
            let mut map = self.inner.lock().expect("counters mutex poisoned");
            *map.entry((source, label)).or_insert(0) += 1;
        }
        // Mirror onto the Prometheus surface for ops dashboards.
        counter!(
            "pulse_sentiment_total",
            "source" => source.as_str(),
            "label" => label.as_str()
        )
        .increment(1);
    }

    /// Consistent per-source read; zero-filled for the three known labels so
    /// percentage math downstream never divides by a missing key.
    pub fn snapshot(&self, source: Source) -> HashMap<SentimentLabel, u64> {
        let map = self.inner.lock().expect("counters mutex poisoned");
        let mut out = HashMap::from([
            (SentimentLabel::Positive, 0),
            (SentimentLabel::Negative, 0),
            (SentimentLabel::Neutral, 0),
        ]);
        for ((s, label), count) in map.iter() {
            if *s == source {
                *out.entry(*label).or_insert(0) += count;
            }
        }
        out
    }

    pub fn total(&self, source: Source) -> u64 {
        self.snapshot(source).values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn snapshot_is_zero_filled() {
        let c = SentimentCounters::new();
        let snap = c.snapshot(Source::TwitterPost);
        assert_eq!(snap.len(), 3);
        assert!(snap.values().all(|&v| v == 0));
    }

    #[test]
    fn increments_are_scoped_by_source_and_label() {
        let c = SentimentCounters::new();
        c.increment(Source::TwitterPost, SentimentLabel::Positive);
        c.increment(Source::TwitterPost, SentimentLabel::Positive);
        c.increment(Source::FormResponse, SentimentLabel::Negative);

        let tw = c.snapshot(Source::TwitterPost);
        assert_eq!(tw[&SentimentLabel::Positive], 2);
        assert_eq!(tw[&SentimentLabel::Negative], 0);
        assert_eq!(c.total(Source::TwitterPost), 2);
        assert_eq!(c.total(Source::FormResponse), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_never_lose_counts() {
        let c = Arc::new(SentimentCounters::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = Arc::clone(&c);
            handles.push(tokio::spawn(async move {
                for _ in 0..250 {
                    c.increment(Source::YoutubeComment, SentimentLabel::Neutral);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(c.total(Source::YoutubeComment), 2000);
    }
}
