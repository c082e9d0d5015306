//! Scoring policy constants. These are the tunable surface of the whole
//! pipeline; nothing else in the crate hard-codes a weight or threshold.

/// Score assigned to blank text and to classifier failures.
pub const NEUTRAL_SCORE: f64 = 0.5;

// ---- validation score ----
pub const SENTIMENT_WEIGHT: f64 = 0.4;
pub const ENGAGEMENT_WEIGHT: f64 = 0.4;
pub const TEMPORAL_WEIGHT: f64 = 0.2;

pub const POSITIVE_VALUE: f64 = 1.0;
pub const NEUTRAL_VALUE: f64 = 0.5;
pub const NEGATIVE_VALUE: f64 = 0.0;

/// Total engagement at which the engagement component saturates.
pub const MAX_ENGAGEMENT: f64 = 1000.0;
/// Posts per day at which the temporal component saturates.
pub const AVG_POSTS_THRESHOLD: f64 = 5.0;

// ---- confidence score ----
pub const POST_CONFIDENCE_WEIGHT: f64 = 0.4;
pub const ENGAGEMENT_CONFIDENCE_WEIGHT: f64 = 0.4;
pub const ACTIVITY_CONFIDENCE_WEIGHT: f64 = 0.2;

pub const CONFIDENT_POST_COUNT: f64 = 20.0;
pub const CONFIDENT_ENGAGEMENT: f64 = 200.0;
pub const CONFIDENT_POSTS_PER_DAY: f64 = 3.0;

// ---- flags ----
pub const MIN_SAMPLE_SIZE: usize = 10;
pub const MIN_TOTAL_ENGAGEMENT: i64 = 50;
pub const MIN_POSTS_PER_DAY: f64 = 1.0;

/// Default number of classifier calls in flight per scoring run.
pub const DEFAULT_CLASSIFY_CONCURRENCY: usize = 4;
