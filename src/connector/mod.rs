// src/connector/mod.rs
pub mod static_feed;

use crate::error::FetchError;
use crate::model::{Cursor, RawItem, Source};

/// Polling cadence class. Cheap/high-churn feeds poll fast; expensive or
/// rate-limited feeds poll slow. Concrete intervals come from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// ~30s base interval (social timelines, comments).
    Fast,
    /// ~5min base interval (form responses, quota-limited APIs).
    Slow,
}

/// One page of raw items plus the position to resume from next run.
/// `items` are oldest-first so a partially processed batch leaves the cursor
/// covering only fully processed items.
#[derive(Debug, Clone)]
pub struct FetchPage {
    pub items: Vec<RawItem>,
    pub next_cursor: Cursor,
}

impl FetchPage {
    /// A fetch that found nothing new; the cursor stays where it was.
    pub fn empty(cursor: Cursor) -> Self {
        Self {
            items: Vec::new(),
            next_cursor: cursor,
        }
    }
}

/// One per-platform feed. Implementations own pagination tokens, auth
/// refresh, and rate-limit headers; they must be side-effect-free with
/// respect to pipeline state (no classification, no storage).
#[async_trait::async_trait]
pub trait SourceConnector: Send + Sync {
    /// Fetch items after `cursor`, oldest-first, plus the new resume point.
    async fn fetch(&self, cursor: &Cursor) -> Result<FetchPage, FetchError>;

    /// The feed this connector serves; also its identity in the cursor store
    /// and the scheduler health map.
    fn source(&self) -> Source;

    fn cadence(&self) -> Cadence {
        Cadence::Fast
    }
}
