use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::http::HeaderValue;

use crate::auth::{parse_users, UserEntry};
use crate::collector::TimeFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,

    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub users: Vec<UserEntry>,

    pub sentiment_api_url: Option<String>,
    pub sentiment_api_token: Option<String>,

    pub reddit_base_url: String,
    pub reddit_user_agent: String,
    pub time_filter: TimeFilter,
    pub post_limit: usize,
    pub min_score: i64,

    pub worker_concurrency: usize,
    pub max_attempts: i64,
    pub retry_delay: Duration,

    pub cors_allow_origin: HeaderValue,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Missing required env var: {key}"))
        };
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let opt = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = or("DATABASE_URL", "sqlite://validator.db?mode=rwc");
        let bind_addr = or("BIND_ADDR", "0.0.0.0:8000");

        let jwt_secret = get("JWT_SECRET_KEY")?;
        let token_minutes: u64 = parse_num(&or("ACCESS_TOKEN_EXPIRE_MINUTES", "30"), "ACCESS_TOKEN_EXPIRE_MINUTES")?;
        let users = parse_users(&or("AUTH_USERS", "")).context("Invalid AUTH_USERS")?;

        let sentiment_api_url = opt("SENTIMENT_API_URL");
        let sentiment_api_token = opt("SENTIMENT_API_TOKEN");

        let reddit_base_url = or("REDDIT_BASE_URL", "https://www.reddit.com");
        let reddit_user_agent = or("REDDIT_USER_AGENT", "problem-validator/0.1");
        let time_filter_raw = or("COLLECT_TIME_FILTER", "month");
        let time_filter = TimeFilter::parse(&time_filter_raw)
            .with_context(|| format!("COLLECT_TIME_FILTER: unknown value {time_filter_raw:?}"))?;
        let post_limit: usize = parse_num(&or("COLLECT_POST_LIMIT", "100"), "COLLECT_POST_LIMIT")?;
        let min_score: i64 = parse_num(&or("COLLECT_MIN_SCORE", "10"), "COLLECT_MIN_SCORE")?;

        let worker_concurrency: usize = parse_num(&or("WORKER_CONCURRENCY", "2"), "WORKER_CONCURRENCY")?;
        let max_attempts: i64 = parse_num(&or("TASK_MAX_ATTEMPTS", "3"), "TASK_MAX_ATTEMPTS")?;
        let retry_delay_secs: u64 = parse_num(&or("TASK_RETRY_DELAY_SECS", "5"), "TASK_RETRY_DELAY_SECS")?;

        let cors_raw = or("CORS_ALLOW_ORIGIN", "http://localhost:3000");
        let cors_allow_origin = HeaderValue::from_str(&cors_raw)
            .with_context(|| format!("CORS_ALLOW_ORIGIN is not a valid header value: {cors_raw:?}"))?;

        let log_format = match or("LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "text" | "pretty" | "" => LogFormat::Text,
            other => bail!("LOG_FORMAT must be text or json, got {other:?}"),
        };

        // Tiny sanity checks (fail fast, fail loud)
        if !database_url.starts_with("sqlite:") {
            bail!("DATABASE_URL must be a sqlite: URL");
        }
        if jwt_secret.len() < 16 {
            bail!("JWT_SECRET_KEY must be at least 16 bytes");
        }
        if token_minutes == 0 {
            bail!("ACCESS_TOKEN_EXPIRE_MINUTES must be > 0");
        }
        for (key, url) in [("REDDIT_BASE_URL", Some(&reddit_base_url)), ("SENTIMENT_API_URL", sentiment_api_url.as_ref())] {
            if let Some(url) = url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    bail!("{key} must start with http:// or https://");
                }
            }
        }
        if worker_concurrency == 0 {
            bail!("WORKER_CONCURRENCY must be > 0");
        }
        if max_attempts < 1 {
            bail!("TASK_MAX_ATTEMPTS must be >= 1");
        }

        Ok(Self {
            database_url,
            bind_addr,
            jwt_secret,
            token_ttl: Duration::from_secs(token_minutes * 60),
            users,
            sentiment_api_url,
            sentiment_api_token,
            reddit_base_url,
            reddit_user_agent,
            time_filter,
            post_limit,
            min_score,
            worker_concurrency,
            max_attempts,
            retry_delay: Duration::from_secs(retry_delay_secs),
            cors_allow_origin,
            log_format,
        })
    }
}

fn parse_num<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{key} must be a number, got {raw:?}"))
}
