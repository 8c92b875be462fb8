// src/connector/static_feed.rs
// Scripted connector backed by an in-memory queue of fetch outcomes.
// Serves demo wiring and tests the same way fixture providers do for a live
// feed: each `fetch` pops the next scripted outcome; an exhausted script
// yields empty pages forever.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::anyhow;
use serde::Deserialize;

use crate::connector::{Cadence, FetchPage, SourceConnector};
use crate::error::FetchError;
use crate::model::{Cursor, RawItem, Source};

#[derive(Debug, Clone)]
pub enum ScriptedFetch {
    /// Serve these items (oldest-first) and advance the cursor to the last
    /// item's source id.
    Page(Vec<RawItem>),
    /// Fail once with a retryable error.
    Transient(String),
    /// Fail once with a connector-disabling error.
    Fatal(String),
}

pub struct StaticFeedConnector {
    source: Source,
    cadence: Cadence,
    script: Mutex<VecDeque<ScriptedFetch>>,
}

impl StaticFeedConnector {
    pub fn new(source: Source, script: Vec<ScriptedFetch>) -> Self {
        Self {
            source,
            cadence: Cadence::Fast,
            script: Mutex::new(script.into()),
        }
    }

    /// Single-page convenience for tests and demos.
    pub fn from_items(source: Source, items: Vec<RawItem>) -> Self {
        Self::new(source, vec![ScriptedFetch::Page(items)])
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Load a feed script from JSON:
    /// `{ "source": "twitter-post", "cadence": "fast", "pages": [[item...]] }`.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        #[derive(Deserialize)]
        struct FeedFile {
            source: Source,
            #[serde(default)]
            cadence: Option<String>,
            pages: Vec<Vec<RawItem>>,
        }
        let f: FeedFile = serde_json::from_str(raw)?;
        let cadence = match f.cadence.as_deref() {
            Some("slow") => Cadence::Slow,
            _ => Cadence::Fast,
        };
        let script = f.pages.into_iter().map(ScriptedFetch::Page).collect();
        Ok(Self::new(f.source, script).with_cadence(cadence))
    }
}

#[async_trait::async_trait]
impl SourceConnector for StaticFeedConnector {
    async fn fetch(&self, cursor: &Cursor) -> Result<FetchPage, FetchError> {
        let next = {
            let mut script = self.script.lock().expect("feed script mutex poisoned");
            script.pop_front()
        };

        match next {
            None => Ok(FetchPage::empty(cursor.clone())),
            Some(ScriptedFetch::Page(items)) => {
                let next_cursor = items
                    .last()
                    .map(|it| Cursor::at(it.source_id.clone()))
                    .unwrap_or_else(|| cursor.clone());
                Ok(FetchPage { items, next_cursor })
            }
            Some(ScriptedFetch::Transient(msg)) => Err(FetchError::transient(anyhow!(msg))),
            Some(ScriptedFetch::Fatal(msg)) => Err(FetchError::fatal(anyhow!(msg))),
        }
    }

    fn source(&self) -> Source {
        self.source
    }

    fn cadence(&self) -> Cadence {
        self.cadence
    }
}
