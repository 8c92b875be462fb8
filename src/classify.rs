// src/classify.rs
// Classifier and escalation ports plus the built-in lexicon fallback.
// The real model (LLM or hosted inference) plugs in behind `Classifier`;
// the pipeline never cares which is wired.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::ClassifyError;
use crate::model::{FeedbackItem, SentimentLabel, Severity};

/// What the classifier says about one piece of text.
///
/// `label` never comes back `Unknown` from a successful call; `Unknown` is
/// reserved for classification failures and assigned by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub label: SentimentLabel,
    pub confidence: f32,
    pub urgent: bool,
}

/// Sentiment/urgency scoring port. May be slow (model inference); callers
/// bound it with a timeout and must not hold locks across the await.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Verdict, ClassifyError>;
}

/// Escalation verdict for a negative, non-urgent item.
#[derive(Debug, Clone, PartialEq)]
pub struct Escalation {
    pub severity: Severity,
    pub category: String,
}

/// Secondary severity call consulted only for negative items that did not
/// already trip the urgency gate.
#[async_trait::async_trait]
pub trait SeverityEscalator: Send + Sync {
    async fn escalate(&self, item: &FeedbackItem) -> Result<Escalation, ClassifyError>;
}

/// Urgency keyword gate. A hit dominates whatever the model said: the item
/// is urgent even when the classifier disagrees.
#[derive(Debug, Clone)]
pub struct UrgentKeywords {
    words: Vec<String>,
}

impl UrgentKeywords {
    pub fn new(words: Vec<String>) -> Self {
        Self {
            words: words
                .into_iter()
                .map(|w| w.trim().to_ascii_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn defaults() -> Self {
        Self::new(
            ["crowd", "emergency", "accident", "stampede", "fire", "medical"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }

    pub fn matches(&self, text: &str) -> bool {
        let lower = text.to_ascii_lowercase();
        self.words.iter().any(|w| lower.contains(w.as_str()))
    }
}

static LEXICON: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    let entries: [(&str, i32); 38] = [
        // praise
        ("great", 2),
        ("amazing", 2),
        ("awesome", 2),
        ("fantastic", 2),
        ("excellent", 2),
        ("love", 2),
        ("loved", 2),
        ("good", 1),
        ("fun", 1),
        ("enjoyed", 1),
        ("best", 2),
        ("wonderful", 2),
        ("smooth", 1),
        ("helpful", 1),
        ("friendly", 1),
        ("thanks", 1),
        ("thank", 1),
        // complaints
        ("bad", -1),
        ("poor", -1),
        ("slow", -1),
        ("boring", -1),
        ("terrible", -2),
        ("awful", -2),
        ("horrible", -2),
        ("worst", -2),
        ("hate", -2),
        ("broken", -2),
        ("rude", -2),
        ("dirty", -1),
        ("queue", -1),
        ("queues", -1),
        ("waiting", -1),
        ("crowded", -2),
        ("unsafe", -2),
        ("dangerous", -2),
        ("disaster", -2),
        ("refund", -2),
        ("scam", -2),
    ];
    entries.into_iter().collect()
});

/// Zero-dependency fallback classifier: lexicon scoring with a short
/// negation window. Good enough for demos and tests; production wires a
/// model behind the same trait.
#[derive(Debug, Clone, Default)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Returns (score, token count). A negator within the previous three
    /// tokens inverts the sign of a scored word.
    fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score = 0i32;
        for i in 0..tokens.len() {
            let base = *LEXICON.get(tokens[i].as_str()).unwrap_or(&0);
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }
        (score, tokens.len())
    }
}

#[async_trait::async_trait]
impl Classifier for LexiconClassifier {
    async fn classify(&self, text: &str) -> Result<Verdict, ClassifyError> {
        if text.trim().is_empty() {
            return Err(ClassifyError::msg("empty text"));
        }
        let (score, tokens) = self.score_text(text);
        let label = match score {
            s if s > 0 => SentimentLabel::Positive,
            s if s < 0 => SentimentLabel::Negative,
            _ => SentimentLabel::Neutral,
        };
        // Confidence grows with score density, clamped to a sane band.
        let density = score.unsigned_abs() as f32 / (tokens.max(1) as f32);
        let confidence = if score == 0 {
            0.5
        } else {
            (0.55 + density).min(0.95)
        };
        Ok(Verdict {
            label,
            confidence,
            urgent: false,
        })
    }
}

/// Keyword-bucket escalator mirroring the issue categories the original
/// operator playbook monitors. Safety-adjacent complaints escalate to
/// critical/high; the rest stay medium/low.
#[derive(Debug, Clone, Default)]
pub struct HeuristicEscalator;

#[async_trait::async_trait]
impl SeverityEscalator for HeuristicEscalator {
    async fn escalate(&self, item: &FeedbackItem) -> Result<Escalation, ClassifyError> {
        let lower = item.text.to_ascii_lowercase();
        let hit = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        let (severity, category) = if hit(&["unsafe", "dangerous", "injur", "collapse", "crush"]) {
            (Severity::Critical, "safety")
        } else if hit(&["overcrowd", "crowded", "packed", "blocked"]) {
            (Severity::High, "overcrowding")
        } else if hit(&["audio", "stream", "screen", "mic", "broken", "app"]) {
            (Severity::High, "technical")
        } else if hit(&["queue", "line", "waiting", "wait"]) {
            (Severity::Medium, "wait-times")
        } else if hit(&["staff", "rude", "security"]) {
            (Severity::Medium, "staff")
        } else {
            (Severity::Low, "general")
        };

        Ok(Escalation {
            severity,
            category: category.to_string(),
        })
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not" | "no" | "never" | "isn" | "wasn" | "aren" | "cannot" | "without"
    )
}
