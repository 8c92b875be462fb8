// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod aggregate;
pub mod alert;
pub mod classify;
pub mod config;
pub mod connector;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod scheduler;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::SentimentCounters;
pub use crate::alert::{AlertDispatcher, AlertNotification};
pub use crate::classify::{Classifier, SeverityEscalator, UrgentKeywords, Verdict};
pub use crate::connector::{Cadence, FetchPage, SourceConnector};
pub use crate::error::{ClassifyError, FetchError, PersistenceError};
pub use crate::model::{
    Alert, Cursor, FeedbackItem, ItemKey, RawItem, SentimentLabel, Severity, Source,
};
pub use crate::pipeline::{IngestionPipeline, PipelineCfg, RunReport};
pub use crate::scheduler::{ConnectorHealth, Scheduler, SchedulerCfg};
pub use crate::store::{AlertStore, CursorStore, ItemStore, UpsertOutcome};
