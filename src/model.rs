// src/model.rs
// Canonical domain types shared by every pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Originating feed of a feedback item. One connector exists per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    TwitterPost,
    TwitterComment,
    InstagramPost,
    InstagramComment,
    YoutubeComment,
    FormResponse,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::TwitterPost => "twitter-post",
            Source::TwitterComment => "twitter-comment",
            Source::InstagramPost => "instagram-post",
            Source::InstagramComment => "instagram-comment",
            Source::YoutubeComment => "youtube-comment",
            Source::FormResponse => "form-response",
        }
    }

    pub const ALL: [Source; 6] = [
        Source::TwitterPost,
        Source::TwitterComment,
        Source::InstagramPost,
        Source::InstagramComment,
        Source::YoutubeComment,
        Source::FormResponse,
    ];
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized three-value sentiment plus `Unknown` for classifier failures.
/// Set once at ingestion, never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
    Unknown,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Unknown => "unknown",
        }
    }

    /// Labels that participate in metric counting.
    pub fn is_known(&self) -> bool {
        !matches!(self, SentimentLabel::Unknown)
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered so the severity floor is a plain comparison (`severity >= floor`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural key of a feedback item: the platform-assigned id scoped by source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub source: Source,
    pub source_id: String,
}

impl ItemKey {
    pub fn new(source: Source, source_id: impl Into<String>) -> Self {
        Self {
            source,
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.source_id)
    }
}

/// What a connector hands the pipeline: unscored, unstored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub source_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Canonical URL or similar platform reference, when the feed exposes one.
    pub cross_reference: Option<String>,
}

/// A fully processed feedback item. At most one exists per `(source, source_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub source: Source,
    pub source_id: String,
    pub text: String,
    pub sentiment: SentimentLabel,
    pub confidence: f32,
    pub urgent: bool,
    pub created_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub cross_reference: Option<String>,
}

impl FeedbackItem {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.source, self.source_id.clone())
    }
}

/// Alert input before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub trigger: ItemKey,
    pub severity: Severity,
    pub category: String,
    pub message: String,
    pub source_url: Option<String>,
}

/// Persisted alert. Created by the dispatcher, mutated only by
/// acknowledgment, never deleted by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub trigger: ItemKey,
    pub severity: Severity,
    pub category: String,
    pub message: String,
    pub source_url: Option<String>,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

/// Opaque resumable position within a source feed. The encoding (max id seen,
/// next-page token) belongs to the connector; the pipeline only threads the
/// value through and persists it after a clean batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(pub Option<String>);

impl Cursor {
    /// Position before anything has been fetched.
    pub fn start() -> Self {
        Cursor(None)
    }

    pub fn at(pos: impl Into<String>) -> Self {
        Cursor(Some(pos.into()))
    }

    pub fn position(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(p) => f.write_str(p),
            None => f.write_str("<start>"),
        }
    }
}
