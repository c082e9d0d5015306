use std::sync::Arc;

use scoring::{TextSentimentClassifier, ValidationScorer};
use sqlx::SqlitePool;

use crate::auth::Authenticator;
use crate::cache::TtlCache;
use crate::collector::{CollectConfig, PostCollector};
use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::rate_limit::RateLimits;
use crate::result_store::ResultStore;
use crate::task_store::TaskStore;
use crate::worker_loop::WorkerSettings;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: AppConfig,
    pub pool: SqlitePool,
    pub tasks: TaskStore,
    pub results: ResultStore,
    pub cache: TtlCache,
    pub auth: Authenticator,
    pub limits: RateLimits,
    pub collector: Arc<dyn PostCollector>,
    pub scorer: ValidationScorer,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        pool: SqlitePool,
        collector: Arc<dyn PostCollector>,
        classifier: Arc<dyn TextSentimentClassifier>,
    ) -> Result<Self, prometheus::Error> {
        let auth = Authenticator::new(config.users.clone(), &config.jwt_secret, config.token_ttl);
        Ok(Self {
            tasks: TaskStore::new(pool.clone()),
            results: ResultStore::new(pool.clone()),
            cache: TtlCache::new(),
            auth,
            limits: RateLimits::new(),
            collector,
            scorer: ValidationScorer::new(classifier),
            metrics: Metrics::new()?,
            pool,
            config,
        })
    }

    pub fn collect_config(&self) -> CollectConfig {
        CollectConfig {
            time_filter: self.config.time_filter,
            post_limit: self.config.post_limit,
            ..CollectConfig::default()
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            concurrency: self.config.worker_concurrency,
            max_attempts: self.config.max_attempts,
            retry_delay: self.config.retry_delay,
            ..WorkerSettings::default()
        }
    }
}
