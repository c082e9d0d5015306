use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::debug;

use crate::policy::*;
use crate::{
    EngagementMetrics, Post, ScoredItem, SentimentLabel, SentimentSummary, TemporalAnalysis,
    TextSentimentClassifier, ValidationFlag, ValidationReport,
};

/// Bucket shared by every post without an author.
pub const UNKNOWN_AUTHOR: &str = "unknown";

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("post #{index} ({}) has no created_utc", .post_id.as_deref().unwrap_or("no id"))]
    MissingTimestamp { index: usize, post_id: Option<String> },

    #[error("post #{index} ({}) has unparseable created_utc {value:?}", .post_id.as_deref().unwrap_or("no id"))]
    InvalidTimestamp { index: usize, post_id: Option<String>, value: String },
}

pub type Result<T> = std::result::Result<T, ScoringError>;

/// Turns a batch of posts into a [`ValidationReport`].
///
/// Holds nothing but the classifier handle, so one scorer can serve
/// concurrent `score` calls as long as the classifier is thread-safe.
#[derive(Clone)]
pub struct ValidationScorer {
    classifier: Arc<dyn TextSentimentClassifier>,
    concurrency: usize,
}

impl ValidationScorer {
    pub fn new(classifier: Arc<dyn TextSentimentClassifier>) -> Self {
        Self { classifier, concurrency: DEFAULT_CLASSIFY_CONCURRENCY }
    }

    /// Max classifier calls in flight during one `score` call.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub async fn score(&self, posts: &[Post]) -> Result<ValidationReport> {
        if posts.is_empty() {
            return Ok(ValidationReport::empty());
        }

        // Timestamps are checked before any inference is spent on the batch.
        let dates = post_timestamps(posts)?;
        let items = self.classify_items(posts).await;
        debug!(posts = posts.len(), items = items.len(), "scorer: classified batch");

        Ok(assemble(posts, &items, &dates))
    }

    /// Classifies every post (title + content) and every comment body.
    /// Output order is posts-then-their-comments regardless of completion order.
    pub async fn classify_items(&self, posts: &[Post]) -> Vec<ScoredItem> {
        let mut units: Vec<(String, i64)> = Vec::new();
        for post in posts {
            units.push((post.text(), post.score));
            for c in &post.top_comments {
                units.push((c.body.clone(), c.engagement()));
            }
        }

        let classifier = &*self.classifier;
        stream::iter(units)
            .map(|(text, engagement)| async move {
                let r = classifier.classify(&text).await;
                ScoredItem {
                    label: r.label,
                    score: r.score,
                    weighted_score: r.score * engagement_weight(engagement as f64),
                }
            })
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await
    }
}

/// Aggregates already-classified items. Same result as `score` minus the
/// classification step.
pub fn aggregate(posts: &[Post], items: &[ScoredItem]) -> Result<ValidationReport> {
    if posts.is_empty() {
        return Ok(ValidationReport::empty());
    }
    let dates = post_timestamps(posts)?;
    Ok(assemble(posts, items, &dates))
}

fn assemble(posts: &[Post], items: &[ScoredItem], dates: &[DateTime<Utc>]) -> ValidationReport {
    let sentiment_summary = summarize_sentiment(items);
    let engagement_metrics = engagement_metrics(posts);
    let temporal_analysis = temporal_analysis(posts.len(), dates);

    ValidationReport {
        validation_flags: validation_flags(posts.len(), &engagement_metrics, &temporal_analysis),
        validation_score: validation_score(&sentiment_summary, &engagement_metrics, &temporal_analysis),
        confidence_score: confidence_score(posts.len(), &engagement_metrics, &temporal_analysis),
        sentiment_summary,
        engagement_metrics,
        temporal_analysis,
    }
}

/// `1 + ln(1 + engagement)`; negative engagement is floored at 0 so the
/// multiplier never drops below 1.
pub fn engagement_weight(engagement: f64) -> f64 {
    1.0 + (1.0 + engagement.max(0.0)).ln()
}

pub fn summarize_sentiment(items: &[ScoredItem]) -> SentimentSummary {
    if items.is_empty() {
        return SentimentSummary::neutral();
    }

    let mut counts = [0usize; 3];
    let mut score_sum = 0.0;
    let mut weighted_sum = 0.0;
    for it in items {
        counts[label_slot(it.label)] += 1;
        score_sum += it.score;
        weighted_sum += it.weighted_score;
    }

    // Ties go to the first label in SentimentLabel::ALL order.
    let mut overall = SentimentLabel::ALL[0];
    let mut best = counts[0];
    for label in SentimentLabel::ALL.iter().skip(1) {
        if counts[label_slot(*label)] > best {
            best = counts[label_slot(*label)];
            overall = *label;
        }
    }

    let total = items.len() as f64;
    SentimentSummary {
        overall_sentiment: overall,
        positive_ratio: counts[0] as f64 / total,
        negative_ratio: counts[1] as f64 / total,
        neutral_ratio: counts[2] as f64 / total,
        average_score: score_sum / total,
        weighted_average_score: weighted_sum / total,
    }
}

fn label_slot(label: SentimentLabel) -> usize {
    match label {
        SentimentLabel::Positive => 0,
        SentimentLabel::Negative => 1,
        SentimentLabel::Neutral => 2,
    }
}

/// Post-level engagement only; comments do not contribute.
pub fn engagement_metrics(posts: &[Post]) -> EngagementMetrics {
    if posts.is_empty() {
        return EngagementMetrics::default();
    }

    let score_sum: i64 = posts.iter().map(|p| p.score).sum();
    let comment_sum: i64 = posts.iter().map(|p| p.num_comments).sum();
    let users: HashSet<&str> = posts
        .iter()
        .map(|p| p.author.as_deref().unwrap_or(UNKNOWN_AUTHOR))
        .collect();

    let n = posts.len() as f64;
    EngagementMetrics {
        avg_score: score_sum as f64 / n,
        avg_comments: comment_sum as f64 / n,
        total_engagement: score_sum + comment_sum,
        unique_users: users.len(),
    }
}

pub fn temporal_analysis(post_count: usize, dates: &[DateTime<Utc>]) -> TemporalAnalysis {
    let (Some(earliest), Some(latest)) = (dates.iter().min(), dates.iter().max()) else {
        return TemporalAnalysis::default();
    };

    let span_days = (*latest - *earliest).num_days() + 1;
    let avg_posts_per_day = if span_days > 0 {
        post_count as f64 / span_days as f64
    } else {
        post_count as f64
    };

    TemporalAnalysis {
        earliest_post: Some(format_timestamp(earliest)),
        latest_post: Some(format_timestamp(latest)),
        avg_posts_per_day,
        activity_period_days: span_days,
    }
}

pub fn validation_flags(
    post_count: usize,
    engagement: &EngagementMetrics,
    temporal: &TemporalAnalysis,
) -> Vec<ValidationFlag> {
    let mut flags = Vec::new();
    if post_count < MIN_SAMPLE_SIZE {
        flags.push(ValidationFlag::LowSampleSize);
    }
    if engagement.total_engagement < MIN_TOTAL_ENGAGEMENT {
        flags.push(ValidationFlag::LowEngagement);
    }
    if temporal.avg_posts_per_day < MIN_POSTS_PER_DAY {
        flags.push(ValidationFlag::LowActivity);
    }
    flags
}

pub fn validation_score(
    sentiment: &SentimentSummary,
    engagement: &EngagementMetrics,
    temporal: &TemporalAnalysis,
) -> f64 {
    let sentiment_component = sentiment.positive_ratio * POSITIVE_VALUE
        + sentiment.neutral_ratio * NEUTRAL_VALUE
        + sentiment.negative_ratio * NEGATIVE_VALUE;
    let engagement_component = saturate(engagement.total_engagement as f64 / MAX_ENGAGEMENT);
    let temporal_component = saturate(temporal.avg_posts_per_day / AVG_POSTS_THRESHOLD);

    bounded(
        sentiment_component * SENTIMENT_WEIGHT
            + engagement_component * ENGAGEMENT_WEIGHT
            + temporal_component * TEMPORAL_WEIGHT,
    )
}

pub fn confidence_score(
    post_count: usize,
    engagement: &EngagementMetrics,
    temporal: &TemporalAnalysis,
) -> f64 {
    let post_confidence = saturate(post_count as f64 / CONFIDENT_POST_COUNT);
    let engagement_confidence = saturate(engagement.total_engagement as f64 / CONFIDENT_ENGAGEMENT);
    let activity_confidence = saturate(temporal.avg_posts_per_day / CONFIDENT_POSTS_PER_DAY);

    bounded(
        post_confidence * POST_CONFIDENCE_WEIGHT
            + engagement_confidence * ENGAGEMENT_CONFIDENCE_WEIGHT
            + activity_confidence * ACTIVITY_CONFIDENCE_WEIGHT,
    )
}

fn saturate(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Clamp to [0, 1] and round to two decimals.
fn bounded(x: f64) -> f64 {
    round2(x.clamp(0.0, 1.0))
}

/// Two-decimal rounding of the exact binary value, ties to even. Scaling by
/// 100 first would round twice (0.365 is stored just below 0.365, but
/// `0.365 * 100.0` is exactly 36.5).
pub fn round2(x: f64) -> f64 {
    format!("{x:.2}").parse().unwrap_or(x)
}

// ---- timestamps ----

/// Parses every post's `created_utc`, failing on the first missing or bad one.
pub fn post_timestamps(posts: &[Post]) -> Result<Vec<DateTime<Utc>>> {
    posts
        .iter()
        .enumerate()
        .map(|(index, p)| {
            let raw = p.created_utc.as_deref().ok_or_else(|| ScoringError::MissingTimestamp {
                index,
                post_id: p.id.clone(),
            })?;
            parse_timestamp(raw).ok_or_else(|| ScoringError::InvalidTimestamp {
                index,
                post_id: p.id.clone(),
                value: raw.to_string(),
            })
        })
        .collect()
}

/// RFC 3339, naive ISO-8601 date-times (read as UTC), or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
