//! Problem-validation scoring.
//!
//! Classifies posts and comments through a pluggable [`TextSentimentClassifier`],
//! weights each result by engagement, and folds sentiment, engagement and
//! posting cadence into bounded validation and confidence scores.

pub mod policy;
pub mod schema;
pub mod classifier;
pub mod scorer;

pub use schema::*;
pub use classifier::*;
pub use scorer::{
    aggregate, confidence_score, engagement_metrics, engagement_weight, format_timestamp,
    parse_timestamp, post_timestamps, round2, summarize_sentiment, temporal_analysis,
    validation_flags, validation_score, Result, ScoringError, ValidationScorer, UNKNOWN_AUTHOR,
};
