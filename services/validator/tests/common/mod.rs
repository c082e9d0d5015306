#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::Utc;
use http_body_util::BodyExt;
use scoring::{Comment, LexiconClassifier, Post};
use serde_json::Value;
use validator::auth::hash_password_with_cost;
use validator::collector::{CollectorError, PostCollector, TimeFilter};
use validator::config::AppConfig;
use validator::{db, AppState, SharedState};

pub const SECRET: &str = "integration-test-secret-0123456789";

pub fn test_config() -> AppConfig {
    let hash = |pw: &str| hash_password_with_cost(pw, 4).unwrap();
    let users = format!("alice:{},bob:{}:disabled", hash("wonderland"), hash("builder"));
    AppConfig::from_lookup(move |k| match k {
        "JWT_SECRET_KEY" => Some(SECRET.to_string()),
        "AUTH_USERS" => Some(users.clone()),
        "TASK_RETRY_DELAY_SECS" => Some("0".to_string()),
        _ => None,
    })
    .unwrap()
}

/// Serves fixed posts; the first `failures` discovery calls error out.
pub struct StubCollector {
    pub posts: Vec<Post>,
    failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}

impl StubCollector {
    pub fn new(posts: Vec<Post>) -> Self {
        Self::failing(posts, 0)
    }

    pub fn failing(posts: Vec<Post>, failures: usize) -> Self {
        Self { posts, failures_left: AtomicUsize::new(failures), calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl PostCollector for StubCollector {
    async fn find_relevant_subreddits(&self, _: &[String], _: usize) -> Result<Vec<String>, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(CollectorError::Decode("reddit unavailable".into()));
        }
        Ok(vec!["startups".to_string()])
    }

    async fn collect_posts(&self, _: &str, _: &[String], _: TimeFilter, _: usize) -> Result<Vec<Post>, CollectorError> {
        Ok(self.posts.clone())
    }
}

pub fn sample_posts() -> Vec<Post> {
    let mk = |id: &str, title: &str, score: i64, day: u32| Post {
        id: Some(id.to_string()),
        title: title.to_string(),
        content: "Invoicing clients by hand every month".to_string(),
        score,
        num_comments: 4,
        created_utc: Some(format!("2025-03-{day:02}T12:00:00Z")),
        author: Some(format!("user_{id}")),
        url: None,
        subreddit: Some("startups".to_string()),
        top_comments: vec![Comment {
            id: None,
            body: "I love this idea, great timing".to_string(),
            score: Some(12),
            created_utc: None,
        }],
    };
    vec![
        mk("a1", "Invoicing is painful and slow", 40, 1),
        mk("a2", "Any good invoicing tool?", 25, 2),
        mk("a3", "Finally solved invoicing", 60, 3),
    ]
}

pub async fn test_state(collector: Arc<dyn PostCollector>) -> SharedState {
    let pool = db::connect_in_memory().await.unwrap();
    db::migrate(&pool).await.unwrap();
    Arc::new(AppState::new(test_config(), pool, collector, Arc::new(LexiconClassifier::new())).unwrap())
}

pub fn token_for(state: &SharedState, user: &str) -> String {
    state.auth.issue_token(user, Utc::now()).access_token
}

pub fn valid_problem() -> Value {
    serde_json::json!({
        "title": "Freelancers waste hours on invoicing",
        "description": "Independent contractors spend several hours a month building, sending and chasing invoices by hand.",
        "keywords": ["Invoicing", " freelance "],
        "target_market": "freelancers"
    })
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some(t) = token {
        b = b.header("authorization", format!("Bearer {t}"));
    }
    b.body(Body::empty()).unwrap()
}

pub fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut b = Request::builder().method("POST").uri(uri).header("content-type", "application/json");
    if let Some(t) = token {
        b = b.header("authorization", format!("Bearer {t}"));
    }
    b.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(resp: Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(resp: Response<Body>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
