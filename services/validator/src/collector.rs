use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use futures::stream::{self, StreamExt};
use scoring::{format_timestamp, Comment, Post};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Decode error: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "day" => Some(TimeFilter::Day),
            "week" => Some(TimeFilter::Week),
            "month" => Some(TimeFilter::Month),
            "year" => Some(TimeFilter::Year),
            "all" => Some(TimeFilter::All),
            _ => None,
        }
    }
}

/// Source of discussion posts for a set of keywords.
#[async_trait]
pub trait PostCollector: Send + Sync {
    async fn find_relevant_subreddits(&self, keywords: &[String], limit: usize) -> Result<Vec<String>, CollectorError>;

    async fn collect_posts(
        &self,
        subreddit: &str,
        keywords: &[String],
        time_filter: TimeFilter,
        limit: usize,
    ) -> Result<Vec<Post>, CollectorError>;
}

#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub time_filter: TimeFilter,
    pub post_limit: usize,
    pub subreddit_limit: usize,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self { time_filter: TimeFilter::Month, post_limit: 100, subreddit_limit: 5 }
    }
}

/// Discovers subreddits, collects from each, and drops duplicates by id and
/// by content fingerprint. First-seen order is kept; a failing subreddit is skipped.
pub async fn collect_for_problem(
    collector: &dyn PostCollector,
    keywords: &[String],
    cfg: &CollectConfig,
) -> Result<Vec<Post>, CollectorError> {
    let subreddits = collector.find_relevant_subreddits(keywords, cfg.subreddit_limit).await?;
    info!(subreddits = ?subreddits, "collector: discovered");

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_prints: HashSet<blake3::Hash> = HashSet::new();
    let mut out = Vec::new();

    for sub in &subreddits {
        let posts = match collector.collect_posts(sub, keywords, cfg.time_filter, cfg.post_limit).await {
            Ok(p) => p,
            Err(e) => {
                warn!(subreddit = %sub, error = %e, "collector: skipping subreddit");
                continue;
            }
        };
        for post in posts {
            if let Some(id) = &post.id {
                if !seen_ids.insert(id.clone()) {
                    continue;
                }
            }
            if !seen_prints.insert(fingerprint(&post)) {
                debug!(post_id = ?post.id, "collector: duplicate content");
                continue;
            }
            out.push(post);
        }
    }
    Ok(out)
}

/// BLAKE3 over whitespace-collapsed, lower-cased title and body.
pub fn fingerprint(post: &Post) -> blake3::Hash {
    let mut h = blake3::Hasher::new();
    h.update(normalize(&post.title).as_bytes());
    h.update(b"\n");
    h.update(normalize(&post.content).as_bytes());
    h.finalize()
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Case-insensitive substring match on title or body.
pub fn matches_keywords(title: &str, body: &str, keywords: &[String]) -> bool {
    let title = title.to_lowercase();
    let body = body.to_lowercase();
    keywords.iter().map(|k| k.to_lowercase()).any(|k| title.contains(&k) || body.contains(&k))
}

// ---- reddit ----

#[derive(Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Deserialize)]
struct ListingData<T> {
    children: Vec<Thing<T>>,
}

#[derive(Deserialize)]
struct Thing<T> {
    kind: String,
    data: T,
}

#[derive(Deserialize)]
struct RawPost {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    created_utc: Option<f64>,
    author: Option<String>,
    url: Option<String>,
    subreddit: Option<String>,
}

#[derive(Deserialize)]
struct RawComment {
    id: Option<String>,
    body: Option<String>,
    score: Option<i64>,
    created_utc: Option<f64>,
}

const COMMENT_FETCH_CONCURRENCY: usize = 4;

/// Reads Reddit's public JSON listings.
pub struct RedditCollector {
    client: reqwest::Client,
    base_url: String,
    min_score: i64,
    comment_limit: usize,
}

impl RedditCollector {
    pub fn new(base_url: &str, user_agent: &str, min_score: i64) -> Result<Self, CollectorError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            min_score,
            comment_limit: 5,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, CollectorError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).query(query).send().await?;
        if !resp.status().is_success() {
            return Err(CollectorError::Status { url, status: resp.status().as_u16() });
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| CollectorError::Decode(format!("{url}: {e}")))
    }

    async fn top_comments(&self, post_id: &str) -> Result<Vec<Comment>, CollectorError> {
        let query = [("limit", self.comment_limit.to_string()), ("sort", "top".to_string()), ("depth", "1".to_string())];
        let pages: Vec<serde_json::Value> = self.get_json(&format!("/comments/{post_id}.json"), &query).await?;
        let Some(comments) = pages.into_iter().nth(1) else {
            return Ok(vec![]);
        };
        let listing: Listing<RawComment> =
            serde_json::from_value(comments).map_err(|e| CollectorError::Decode(e.to_string()))?;

        Ok(listing
            .data
            .children
            .into_iter()
            .filter(|t| t.kind == "t1")
            .filter_map(|t| {
                let c = t.data;
                Some(Comment {
                    id: c.id,
                    body: c.body?,
                    score: c.score,
                    created_utc: c.created_utc.and_then(epoch_to_iso),
                })
            })
            .take(self.comment_limit)
            .collect())
    }
}

fn epoch_to_iso(secs: f64) -> Option<String> {
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9) as u32;
    DateTime::from_timestamp(whole, nanos).map(|t| format_timestamp(&t))
}

/// Link posts that match a keyword and clear `min_score`, paired with their
/// ISO creation time. A post without a usable `created_utc` is dropped here,
/// since one missing timestamp would fail scoring for the whole batch.
fn select_posts(listing: Listing<RawPost>, keywords: &[String], min_score: i64) -> Vec<(RawPost, String)> {
    listing
        .data
        .children
        .into_iter()
        .filter(|t| t.kind == "t3")
        .map(|t| t.data)
        .filter(|p| matches_keywords(&p.title, &p.selftext, keywords))
        .filter(|p| p.score >= min_score)
        .filter_map(|p| match p.created_utc.and_then(epoch_to_iso) {
            Some(created) => Some((p, created)),
            None => {
                debug!(post_id = %p.id, "collector: post has no creation time, skipped");
                None
            }
        })
        .collect()
}

#[async_trait]
impl PostCollector for RedditCollector {
    async fn find_relevant_subreddits(&self, keywords: &[String], limit: usize) -> Result<Vec<String>, CollectorError> {
        let mut found: Vec<String> = Vec::new();
        for kw in keywords {
            let query = [("q", kw.clone()), ("limit", limit.to_string()), ("type", "link".to_string())];
            let listing: Listing<RawPost> = self.get_json("/search.json", &query).await?;
            for t in listing.data.children {
                if let Some(sub) = t.data.subreddit {
                    if !found.iter().any(|s| s.eq_ignore_ascii_case(&sub)) {
                        found.push(sub);
                    }
                }
            }
        }
        found.truncate(limit);
        Ok(found)
    }

    async fn collect_posts(
        &self,
        subreddit: &str,
        keywords: &[String],
        time_filter: TimeFilter,
        limit: usize,
    ) -> Result<Vec<Post>, CollectorError> {
        let query = [("t", time_filter.as_str().to_string()), ("limit", limit.to_string())];
        let listing: Listing<RawPost> = self.get_json(&format!("/r/{subreddit}/top.json"), &query).await?;

        let matching = select_posts(listing, keywords, self.min_score);

        let posts = stream::iter(matching)
            .map(|(p, created)| async move {
                let top_comments = match self.top_comments(&p.id).await {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(post_id = %p.id, error = %e, "collector: comments unavailable");
                        vec![]
                    }
                };
                Post {
                    id: Some(p.id),
                    title: p.title,
                    content: p.selftext,
                    score: p.score,
                    num_comments: p.num_comments,
                    created_utc: Some(created),
                    author: p.author,
                    url: p.url,
                    subreddit: Some(p.subreddit.unwrap_or_else(|| subreddit.to_string())),
                    top_comments,
                }
            })
            .buffered(COMMENT_FETCH_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        debug!(subreddit, posts = posts.len(), "collector: collected");
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn post(id: &str, title: &str, content: &str) -> Post {
        Post {
            id: Some(id.into()),
            title: title.into(),
            content: content.into(),
            score: 10,
            num_comments: 1,
            created_utc: Some("2025-01-01T00:00:00Z".into()),
            author: None,
            url: None,
            subreddit: None,
            top_comments: vec![],
        }
    }

    struct Fixed {
        subs: Vec<String>,
        by_sub: HashMap<String, Result<Vec<Post>, ()>>,
    }

    #[async_trait]
    impl PostCollector for Fixed {
        async fn find_relevant_subreddits(&self, _: &[String], limit: usize) -> Result<Vec<String>, CollectorError> {
            Ok(self.subs.iter().take(limit).cloned().collect())
        }

        async fn collect_posts(&self, sub: &str, _: &[String], _: TimeFilter, _: usize) -> Result<Vec<Post>, CollectorError> {
            match self.by_sub.get(sub) {
                Some(Ok(p)) => Ok(p.clone()),
                _ => Err(CollectorError::Decode("boom".into())),
            }
        }
    }

    #[tokio::test]
    async fn test_dedup_and_skip_failing_subreddit() {
        let c = Fixed {
            subs: vec!["a".into(), "broken".into(), "b".into()],
            by_sub: HashMap::from([
                ("a".to_string(), Ok(vec![post("1", "Hello", "world"), post("2", "Other", "thing")])),
                (
                    "b".to_string(),
                    // same id again, and a crosspost with different id but same text
                    Ok(vec![post("1", "Hello", "world"), post("9", " hello ", "WORLD"), post("3", "New", "one")]),
                ),
            ]),
        };

        let posts = collect_for_problem(&c, &["x".into()], &CollectConfig::default()).await.unwrap();
        let ids: Vec<_> = posts.iter().map(|p| p.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let kws = vec!["invoice".to_string(), "billing".to_string()];
        assert!(matches_keywords("Invoices are a nightmare", "", &kws));
        assert!(matches_keywords("Help", "our BILLING flow", &kws));
        assert!(!matches_keywords("Help", "nothing here", &kws));
    }

    #[test]
    fn test_epoch_conversion() {
        assert_eq!(epoch_to_iso(1_735_689_600.0).as_deref(), Some("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn test_posts_without_creation_time_are_dropped() {
        let listing: Listing<RawPost> = serde_json::from_value(serde_json::json!({
            "data": {"children": [
                {"kind": "t3", "data": {"id": "a", "title": "invoice hell", "score": 12, "created_utc": 1735689600.0}},
                {"kind": "t3", "data": {"id": "b", "title": "invoice again", "score": 40}},
                {"kind": "t3", "data": {"id": "c", "title": "invoice too", "score": 9, "created_utc": null}},
                {"kind": "t3", "data": {"id": "d", "title": "unrelated", "score": 99, "created_utc": 1735689600.0}},
                {"kind": "t1", "data": {"id": "e", "title": "invoice", "score": 99, "created_utc": 1735689600.0}}
            ]}
        }))
        .unwrap();

        let kept = select_posts(listing, &["invoice".to_string()], 5);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].0.id, "a");
        assert_eq!(kept[0].1, "2025-01-01T00:00:00Z");
    }

    #[test]
    fn test_time_filter_parse() {
        assert_eq!(TimeFilter::parse("Week"), Some(TimeFilter::Week));
        assert_eq!(TimeFilter::parse("fortnight"), None);
    }
}
