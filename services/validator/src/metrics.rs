use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::error::ApiError;
use crate::state::SharedState;
use crate::worker_loop::TaskOutcome;

const SCORE_BUCKETS: [f64; 10] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

/// Prometheus collectors for one service instance. Each instance owns its
/// registry, so tests never share counters.
pub struct Metrics {
    registry: Registry,
    http_requests: IntCounterVec,
    http_duration: HistogramVec,
    validation_requests: IntCounter,
    validation_tasks: IntCounterVec,
    validation_score: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )?;
        let http_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds"),
            &["method", "endpoint"],
        )?;
        let validation_requests =
            IntCounter::new("validation_requests_total", "Total number of problem validation requests")?;
        let validation_tasks = IntCounterVec::new(
            Opts::new("validation_tasks_total", "Validation task runs by outcome"),
            &["outcome"],
        )?;
        let validation_score = Histogram::with_opts(
            HistogramOpts::new("validation_score", "Distribution of validation scores").buckets(SCORE_BUCKETS.to_vec()),
        )?;

        let registry = Registry::new();
        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_duration.clone()))?;
        registry.register(Box::new(validation_requests.clone()))?;
        registry.register(Box::new(validation_tasks.clone()))?;
        registry.register(Box::new(validation_score.clone()))?;

        Ok(Self { registry, http_requests, http_duration, validation_requests, validation_tasks, validation_score })
    }

    pub fn observe_http(&self, method: &str, endpoint: &str, status: u16, elapsed: Duration) {
        self.http_requests.with_label_values(&[method, endpoint, &status.to_string()]).inc();
        self.http_duration.with_label_values(&[method, endpoint]).observe(elapsed.as_secs_f64());
    }

    pub fn record_validation_request(&self) {
        self.validation_requests.inc();
    }

    pub fn record_validation_score(&self, score: f64) {
        self.validation_score.observe(score);
    }

    pub fn record_task_outcome(&self, outcome: TaskOutcome) {
        let label = match outcome {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Retried => "retried",
            TaskOutcome::Failed => "failed",
            TaskOutcome::Discarded => "discarded",
        };
        self.validation_tasks.with_label_values(&[label]).inc();
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Route middleware: counts and times every routed request. The endpoint
/// label is the route template (`/api/v1/validate/:id`), not the raw path.
pub async fn track_http(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let resp = next.run(req).await;
    state.metrics.observe_http(&method, &endpoint, resp.status().as_u16(), started.elapsed());
    resp
}

pub async fn get_metrics(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let body = state.metrics.render()?;
    Ok(([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_exposes_recorded_series() {
        let m = Metrics::new().unwrap();
        m.observe_http("GET", "/health", 200, Duration::from_millis(3));
        m.record_validation_request();
        m.record_validation_score(0.36);
        m.record_task_outcome(TaskOutcome::Retried);

        let text = m.render().unwrap();
        assert!(text.contains(r#"http_requests_total{endpoint="/health",method="GET",status="200"} 1"#));
        assert!(text.contains("validation_requests_total 1"));
        assert!(text.contains(r#"validation_score_bucket{le="0.4"} 1"#));
        assert!(text.contains(r#"validation_score_bucket{le="0.3"} 0"#));
        assert!(text.contains(r#"validation_tasks_total{outcome="retried"} 1"#));
    }

    #[test]
    fn test_instances_do_not_share_counters() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_validation_request();
        assert!(b.render().unwrap().contains("validation_requests_total 0"));
    }
}
