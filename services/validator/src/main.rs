use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use scoring::{LexiconClassifier, TextSentimentClassifier};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use validator::auth::hash_password;
use validator::collector::RedditCollector;
use validator::config::{AppConfig, LogFormat};
use validator::provider_http::HttpSentimentClassifier;
use validator::{build_router, db, worker_loop, AppState};

const SENTIMENT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // `validator hash-password` reads one password from stdin and prints the
    // bcrypt hash for an AUTH_USERS entry.
    if std::env::args().nth(1).as_deref() == Some("hash-password") {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).context("Failed to read password")?;
        println!("{}", hash_password(line.trim_end_matches(['\r', '\n']))?);
        return Ok(());
    }

    let cfg = AppConfig::from_env()?;
    init_tracing(cfg.log_format);

    // --- SQLite ---
    let pool = db::connect(&cfg.database_url, 5)
        .await
        .context("Failed to open database")?;
    db::migrate(&pool).await.context("Failed to run migrations")?;
    db::ping(&pool).await.context("Database ping failed")?;
    info!("database: ok");

    let classifier: Arc<dyn TextSentimentClassifier> = match &cfg.sentiment_api_url {
        Some(url) => {
            info!(url = %url, "sentiment: http backend");
            Arc::new(HttpSentimentClassifier::new(url.clone(), cfg.sentiment_api_token.clone(), SENTIMENT_TIMEOUT)?)
        }
        None => {
            info!("sentiment: SENTIMENT_API_URL unset, using lexicon backend");
            Arc::new(LexiconClassifier::new())
        }
    };
    let collector = Arc::new(
        RedditCollector::new(&cfg.reddit_base_url, &cfg.reddit_user_agent, cfg.min_score)
            .context("Failed to build reddit client")?,
    );

    let state = Arc::new(AppState::new(cfg.clone(), pool, collector, classifier).context("Failed to register metrics")?);

    // RECOVERY: tasks interrupted by the previous run
    if let Err(e) = state.tasks.recover_interrupted(cfg.max_attempts).await {
        warn!("task recovery failed: {e}");
    }

    let cancel = CancellationToken::new();
    let worker = tokio::spawn(worker_loop::run_worker_loop(state.clone(), state.worker_settings(), cancel.clone()));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, "validator listening");

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        shutdown.cancel();
    });

    let server_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await
        .context("HTTP server error")?;

    worker.await.context("worker loop panicked")?;
    info!("validator stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler failed: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
