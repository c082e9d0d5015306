use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::{SentimentLabel, SentimentResult};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Per-text sentiment capability consumed by the scorer.
///
/// Backends implement `infer`; callers use `classify`, which never fails:
/// blank text short-circuits to neutral and any backend error is logged and
/// replaced by neutral, so one bad text unit cannot abort a batch.
/// Backends must accept arbitrary-length input and return one aggregate result.
#[async_trait]
pub trait TextSentimentClassifier: Send + Sync {
    async fn infer(&self, text: &str) -> Result<SentimentResult, ClassifierError>;

    async fn classify(&self, text: &str) -> SentimentResult {
        if text.trim().is_empty() {
            return SentimentResult::neutral();
        }
        match self.infer(text).await {
            Ok(r) => r.clamped(),
            Err(e) => {
                warn!(error = %e, chars = text.len(), "classifier: falling back to neutral");
                SentimentResult::neutral()
            }
        }
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "love", "amazing", "awesome", "best", "fantastic",
    "wonderful", "happy", "useful", "helpful", "helps", "easy", "fast", "recommend",
    "solved", "perfect", "nice", "works",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "hate", "horrible", "worst", "annoying", "frustrating",
    "frustrated", "broken", "useless", "slow", "expensive", "painful", "struggle",
    "disappointed", "poor", "fails", "failing", "problem",
];

/// Word-list classifier. Deterministic and offline; used when no inference
/// endpoint is configured.
pub struct LexiconClassifier {
    positive: HashSet<String>,
    negative: HashSet<String>,
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconClassifier {
    pub fn new() -> Self {
        Self::with_words(POSITIVE_WORDS.iter().copied(), NEGATIVE_WORDS.iter().copied())
    }

    pub fn with_words<'a>(
        positive: impl IntoIterator<Item = &'a str>,
        negative: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            positive: positive.into_iter().map(|w| w.to_lowercase()).collect(),
            negative: negative.into_iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    pub fn analyze(&self, text: &str) -> SentimentResult {
        let mut pos = 0usize;
        let mut neg = 0usize;
        for tok in tokenize(text) {
            if self.positive.contains(&tok) {
                pos += 1;
            } else if self.negative.contains(&tok) {
                neg += 1;
            }
        }

        let total = pos + neg;
        if total == 0 || pos == neg {
            return SentimentResult::neutral();
        }
        let (label, hits) = if pos > neg {
            (SentimentLabel::Positive, pos)
        } else {
            (SentimentLabel::Negative, neg)
        };
        SentimentResult::new(label, hits as f64 / total as f64)
    }
}

#[async_trait]
impl TextSentimentClassifier for LexiconClassifier {
    async fn infer(&self, text: &str) -> Result<SentimentResult, ClassifierError> {
        Ok(self.analyze(text))
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}
