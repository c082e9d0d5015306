use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use scoring::{
    ClassifierError, Comment, LexiconClassifier, Post, ScoringError, SentimentLabel,
    SentimentResult, TextSentimentClassifier, ValidationFlag, ValidationScorer,
};

/// Looks the text up in a fixed table; unknown text is an error (-> neutral).
struct TableClassifier {
    table: HashMap<String, SentimentResult>,
    calls: AtomicUsize,
}

impl TableClassifier {
    fn new(entries: &[(&str, SentimentLabel, f64)]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(t, l, s)| (t.to_string(), SentimentResult::new(*l, *s)))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextSentimentClassifier for TableClassifier {
    async fn infer(&self, text: &str) -> Result<SentimentResult, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table
            .get(text)
            .copied()
            .ok_or_else(|| ClassifierError::Backend(format!("unknown text: {text}")))
    }
}

fn post(title: &str, score: i64, num_comments: i64, created: &str) -> Post {
    Post {
        id: Some(format!("p-{title}")),
        title: title.to_string(),
        content: String::new(),
        score,
        num_comments,
        created_utc: Some(created.to_string()),
        author: None,
        url: None,
        subreddit: None,
        top_comments: vec![],
    }
}

fn comment(body: &str, score: Option<i64>) -> Comment {
    Comment { id: None, body: body.to_string(), score, created_utc: None }
}

fn lexicon_scorer() -> ValidationScorer {
    ValidationScorer::new(Arc::new(LexiconClassifier::new()))
}

#[tokio::test]
async fn test_empty_batch_is_canonical_and_skips_classifier() {
    let stub = Arc::new(TableClassifier::new(&[]));
    let scorer = ValidationScorer::new(stub.clone());

    let report = scorer.score(&[]).await.unwrap();

    assert_eq!(report.validation_score, 0.0);
    assert_eq!(report.confidence_score, 0.0);
    assert_eq!(report.validation_flags, vec![ValidationFlag::InsufficientData]);
    assert_eq!(report.sentiment_summary.neutral_ratio, 1.0);
    assert_eq!(report.sentiment_summary.overall_sentiment, SentimentLabel::Neutral);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_single_post_created_today() {
    let now = Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string();
    let mut p = post("Great solution for a common problem", 100, 10, &now);
    p.content = "This really helps solve a pain point".into();

    let report = lexicon_scorer().score(&[p]).await.unwrap();

    let eng = &report.engagement_metrics;
    assert_eq!(eng.avg_score, 100.0);
    assert_eq!(eng.avg_comments, 10.0);
    assert_eq!(eng.total_engagement, 110);
    assert_eq!(eng.unique_users, 1);

    assert_eq!(report.temporal_analysis.activity_period_days, 1);
    assert_eq!(report.temporal_analysis.avg_posts_per_day, 1.0);

    assert!(report.has_flag(ValidationFlag::LowSampleSize));
    assert!(!report.has_flag(ValidationFlag::LowEngagement));
    assert!(!report.has_flag(ValidationFlag::LowActivity));
}

#[tokio::test]
async fn test_weighting_uses_post_and_comment_engagement() {
    let stub = TableClassifier::new(&[
        ("launch day ", SentimentLabel::Positive, 0.8),
        ("meh", SentimentLabel::Negative, 0.6),
        ("fine", SentimentLabel::Neutral, 0.5),
    ]);
    let mut p = post("launch day", 0, 2, "2025-03-01T10:00:00");
    p.top_comments = vec![comment("meh", Some(0)), comment("fine", None)];

    let scorer = ValidationScorer::new(Arc::new(stub));
    let items = scorer.classify_items(&[p]).await;

    assert_eq!(items.len(), 3);
    // post score 0 and comment score 0 -> multiplier 1
    assert_eq!(items[0].weighted_score, 0.8);
    assert_eq!(items[1].weighted_score, 0.6);
    // missing comment score counts as 1 -> 1 + ln 2
    assert!((items[2].weighted_score - 0.5 * (1.0 + 2f64.ln())).abs() < 1e-12);
}

#[tokio::test]
async fn test_unclassifiable_text_degrades_to_neutral() {
    let stub = TableClassifier::new(&[("known ", SentimentLabel::Positive, 0.9)]);
    let mut p = post("known", 5, 0, "2025-03-01");
    p.top_comments = vec![comment("never seen", Some(3)), comment("   ", Some(3))];

    let stub = Arc::new(stub);
    let report = ValidationScorer::new(stub.clone()).score(&[p]).await.unwrap();

    let s = &report.sentiment_summary;
    assert!((s.positive_ratio - 1.0 / 3.0).abs() < 1e-12);
    assert!((s.neutral_ratio - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(s.overall_sentiment, SentimentLabel::Neutral);
    // the blank comment never reached the backend
    assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_ten_posts_over_ten_days() {
    let start = Utc::now() - Duration::days(30);
    let posts: Vec<Post> = (0..10)
        .map(|i| {
            let ts = (start + Duration::days(i)).to_rfc3339();
            let mut p = post(&format!("post {i}"), 20, 5, &ts);
            p.author = Some(format!("user{}", i % 4));
            p
        })
        .collect();

    let report = lexicon_scorer().score(&posts).await.unwrap();

    assert_eq!(report.temporal_analysis.activity_period_days, 10);
    assert_eq!(report.temporal_analysis.avg_posts_per_day, 1.0);
    assert!(!report.has_flag(ValidationFlag::LowActivity));
    assert!(!report.has_flag(ValidationFlag::LowSampleSize));
    assert_eq!(report.engagement_metrics.unique_users, 4);

    // one more day of span drops below one post per day
    let mut spread = posts.clone();
    spread[9].created_utc = Some((start + Duration::days(10)).to_rfc3339());
    let report = lexicon_scorer().score(&spread).await.unwrap();
    assert_eq!(report.temporal_analysis.activity_period_days, 11);
    assert!(report.has_flag(ValidationFlag::LowActivity));
}

#[tokio::test]
async fn test_missing_authors_share_one_bucket() {
    let mut posts = vec![
        post("a", 1, 0, "2025-01-01"),
        post("b", 1, 0, "2025-01-01"),
        post("c", 1, 0, "2025-01-01"),
    ];
    posts[2].author = Some("alice".into());

    let report = lexicon_scorer().score(&posts).await.unwrap();
    assert_eq!(report.engagement_metrics.unique_users, 2);
}

#[tokio::test]
async fn test_bad_timestamp_fails_whole_batch() {
    let stub = Arc::new(TableClassifier::new(&[]));
    let scorer = ValidationScorer::new(stub.clone());

    let mut posts = vec![post("ok", 1, 1, "2025-01-01"), post("bad", 1, 1, "last tuesday")];
    let err = scorer.score(&posts).await.unwrap_err();
    assert_eq!(
        err,
        ScoringError::InvalidTimestamp {
            index: 1,
            post_id: Some("p-bad".into()),
            value: "last tuesday".into(),
        }
    );

    posts[1].created_utc = None;
    let err = scorer.score(&posts).await.unwrap_err();
    assert!(matches!(err, ScoringError::MissingTimestamp { index: 1, .. }));

    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scores_bounded_and_two_decimals() {
    let bodies = ["love it", "hate it", "it exists", "great great", "slow and broken"];
    for n in 1..=25usize {
        let posts: Vec<Post> = (0..n)
            .map(|i| {
                let mut p = post(bodies[i % bodies.len()], (i as i64 * 37) % 400 - 50, i as i64, "2025-02-01T00:00:00Z");
                p.created_utc = Some(format!("2025-02-{:02}T08:00:00Z", 1 + (i % 28)));
                p.top_comments = vec![comment(bodies[(i + 1) % bodies.len()], Some(i as i64))];
                p
            })
            .collect();

        let r = lexicon_scorer().score(&posts).await.unwrap();
        let s = &r.sentiment_summary;

        assert!((s.positive_ratio + s.negative_ratio + s.neutral_ratio - 1.0).abs() < 1e-9);
        for v in [r.validation_score, r.confidence_score] {
            assert!((0.0..=1.0).contains(&v), "out of range: {v}");
            assert_eq!(format!("{v:.2}").parse::<f64>().unwrap(), v);
        }
    }
}

#[tokio::test]
async fn test_engagement_component_is_monotonic() {
    let mut last = 0.0;
    for score in [0, 100, 400, 900, 1500, 5000] {
        let p = post("it exists", score, 0, "2025-01-01");
        let r = lexicon_scorer().score(&[p]).await.unwrap();
        assert!(r.validation_score >= last);
        last = r.validation_score;
    }
    // neutral 0.5*0.4 + saturated 1.0*0.4 + (1/5)*0.2
    assert_eq!(last, 0.64);
}

#[tokio::test]
async fn test_scoring_is_idempotent() {
    let mut p = post("Great tool", 40, 12, "2025-04-01T09:30:00");
    p.top_comments = vec![comment("awful pricing", Some(7)), comment("works for me", None)];
    let posts = vec![p.clone(), post("another", 3, 1, "2025-04-03T09:30:00")];

    let scorer = lexicon_scorer().with_concurrency(8);
    let a = scorer.score(&posts).await.unwrap();
    let b = scorer.score(&posts).await.unwrap();

    assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
}

#[tokio::test]
async fn test_score_rounding_matches_two_decimal_round() {
    let stub = TableClassifier::new(&[("bad idea ", SentimentLabel::Negative, 0.9)]);
    let mut first = post("bad idea", 100, 20, "2025-04-02T08:00:00");
    first.top_comments = vec![comment("", Some(3)), comment("  ", None), comment("", Some(1))];
    let mut second = post("", 30, 10, "2025-04-02T12:00:00");
    second.top_comments = vec![comment("", None), comment("", Some(7))];
    let third = post("", 10, 5, "2025-04-02T20:00:00");

    let report = ValidationScorer::new(Arc::new(stub)).score(&[first, second, third]).await.unwrap();

    assert_eq!(report.sentiment_summary.negative_ratio, 0.125);
    assert_eq!(report.sentiment_summary.neutral_ratio, 0.875);
    assert_eq!(report.engagement_metrics.total_engagement, 175);
    assert_eq!(report.temporal_analysis.avg_posts_per_day, 3.0);
    assert_eq!(report.validation_score, 0.36);
}
