//! Problem-validation service: accepts problem statements over HTTP, queues
//! them as tasks, and has a worker collect discussion posts and score them.

pub mod auth;
pub mod cache;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod metrics;
pub mod pipeline;
pub mod problem;
pub mod provider_http;
pub mod rate_limit;
pub mod result_store;
pub mod routes_auth;
pub mod routes_health;
pub mod routes_validation;
pub mod state;
pub mod task_store;
pub mod types_tasks;
pub mod worker_loop;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request};
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, SharedState};

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(state.config.cors_allow_origin.clone())
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
        let request_id = req
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!("http", method = %req.method(), uri = %req.uri(), request_id = %request_id)
    });

    Router::new()
        .route("/health", get(routes_health::health))
        .route("/auth/token", post(routes_auth::post_token))
        .route("/auth/me", get(routes_auth::get_me))
        .route("/api/v1/validate", post(routes_validation::post_validate))
        .route("/api/v1/validate/:id", get(routes_validation::get_validation))
        .route("/api/v1/problems", get(routes_validation::list_problems))
        .route("/api/v1/problems/:id", delete(routes_validation::delete_problem))
        .route("/metrics", get(metrics::get_metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), metrics::track_http))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(trace)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}
