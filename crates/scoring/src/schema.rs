use serde::{Deserialize, Serialize};

use crate::policy::NEUTRAL_SCORE;

/// Top-level discussion item as handed over by a collector.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub score: i64,
    pub num_comments: i64,
    /// ISO-8601; required by scoring, kept optional here so a missing value
    /// surfaces as a scoring error instead of a decode failure.
    #[serde(default)]
    pub created_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub top_comments: Vec<Comment>,
}

impl Post {
    /// Text unit classified for the post itself.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.content)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub body: String,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_utc: Option<String>,
}

impl Comment {
    pub const DEFAULT_SCORE: i64 = 1;

    /// Engagement signal for weighting; comments without a score count as 1.
    pub fn engagement(&self) -> i64 {
        self.score.unwrap_or(Self::DEFAULT_SCORE)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Fixed iteration order; also the tie-break priority for the overall label.
    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Positive,
        SentimentLabel::Negative,
        SentimentLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "POSITIVE",
            SentimentLabel::Negative => "NEGATIVE",
            SentimentLabel::Neutral => "NEUTRAL",
        }
    }

    /// Lenient parse for backend labels (`positive`, `LABEL_2`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" | "POS" | "LABEL_2" => Some(SentimentLabel::Positive),
            "NEGATIVE" | "NEG" | "LABEL_0" => Some(SentimentLabel::Negative),
            "NEUTRAL" | "NEU" | "LABEL_1" => Some(SentimentLabel::Neutral),
            _ => None,
        }
    }
}

/// What a classifier returns for one text unit.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    pub score: f64,
}

impl SentimentResult {
    pub fn new(label: SentimentLabel, score: f64) -> Self {
        Self { label, score }
    }

    /// Substitute used for blank text and for any backend failure.
    pub fn neutral() -> Self {
        Self { label: SentimentLabel::Neutral, score: NEUTRAL_SCORE }
    }

    pub(crate) fn clamped(self) -> Self {
        let score = if self.score.is_finite() { self.score.clamp(0.0, 1.0) } else { NEUTRAL_SCORE };
        Self { label: self.label, score }
    }
}

/// A classified text unit with its engagement-weighted score.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoredItem {
    pub label: SentimentLabel,
    pub score: f64,
    pub weighted_score: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SentimentSummary {
    pub overall_sentiment: SentimentLabel,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
    pub neutral_ratio: f64,
    pub average_score: f64,
    pub weighted_average_score: f64,
}

impl SentimentSummary {
    pub fn neutral() -> Self {
        Self {
            overall_sentiment: SentimentLabel::Neutral,
            positive_ratio: 0.0,
            negative_ratio: 0.0,
            neutral_ratio: 1.0,
            average_score: NEUTRAL_SCORE,
            weighted_average_score: NEUTRAL_SCORE,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EngagementMetrics {
    pub avg_score: f64,
    pub avg_comments: f64,
    pub total_engagement: i64,
    pub unique_users: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TemporalAnalysis {
    pub earliest_post: Option<String>,
    pub latest_post: Option<String>,
    pub avg_posts_per_day: f64,
    pub activity_period_days: i64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFlag {
    InsufficientData,
    LowSampleSize,
    LowEngagement,
    LowActivity,
}

impl ValidationFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationFlag::InsufficientData => "insufficient_data",
            ValidationFlag::LowSampleSize => "low_sample_size",
            ValidationFlag::LowEngagement => "low_engagement",
            ValidationFlag::LowActivity => "low_activity",
        }
    }
}

/// Output of one scoring run. Carries no identity; callers attach one when persisting.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub sentiment_summary: SentimentSummary,
    pub engagement_metrics: EngagementMetrics,
    pub temporal_analysis: TemporalAnalysis,
    pub validation_score: f64,
    pub confidence_score: f64,
    pub validation_flags: Vec<ValidationFlag>,
}

impl ValidationReport {
    /// Canonical report for an empty batch.
    pub fn empty() -> Self {
        Self {
            sentiment_summary: SentimentSummary::neutral(),
            engagement_metrics: EngagementMetrics::default(),
            temporal_analysis: TemporalAnalysis::default(),
            validation_score: 0.0,
            confidence_score: 0.0,
            validation_flags: vec![ValidationFlag::InsufficientData],
        }
    }

    pub fn has_flag(&self, flag: ValidationFlag) -> bool {
        self.validation_flags.contains(&flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_engagement_defaults_to_one() {
        let c = Comment { id: None, body: "hi".into(), score: None, created_utc: None };
        assert_eq!(c.engagement(), 1);
        let c = Comment { score: Some(0), ..c };
        assert_eq!(c.engagement(), 0);
    }

    #[test]
    fn test_label_parse_variants() {
        assert_eq!(SentimentLabel::parse("positive"), Some(SentimentLabel::Positive));
        assert_eq!(SentimentLabel::parse("LABEL_0"), Some(SentimentLabel::Negative));
        assert_eq!(SentimentLabel::parse(" Neutral "), Some(SentimentLabel::Neutral));
        assert_eq!(SentimentLabel::parse("mixed"), None);
    }

    #[test]
    fn test_report_wire_shape() {
        let json = serde_json::to_value(ValidationReport::empty()).unwrap();
        assert_eq!(json["validation_flags"][0], "insufficient_data");
        assert_eq!(json["sentiment_summary"]["overall_sentiment"], "NEUTRAL");
        assert_eq!(json["sentiment_summary"]["neutral_ratio"], 1.0);
        assert!(json["temporal_analysis"]["earliest_post"].is_null());
    }

    #[test]
    fn test_post_decodes_with_minimal_fields() {
        let p: Post = serde_json::from_str(
            r#"{"title":"t","score":3,"num_comments":1,"created_utc":"2025-01-01T00:00:00"}"#,
        )
        .unwrap();
        assert!(p.top_comments.is_empty());
        assert_eq!(p.content, "");
        assert_eq!(p.text(), "t ");
    }
}
