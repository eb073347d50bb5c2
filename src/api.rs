use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::history::{RunHistory, RunSummary};
use crate::pipeline::PipelineExecutor;

#[derive(Clone)]
pub struct AppState {
    executor: Arc<dyn PipelineExecutor>,
    running: Arc<AtomicBool>,
    history: Arc<RunHistory>,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(executor: Arc<dyn PipelineExecutor>, history_cap: usize) -> Self {
        Self {
            executor,
            running: Arc::new(AtomicBool::new(false)),
            history: Arc::new(RunHistory::with_capacity(history_cap)),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn history(&self) -> Arc<RunHistory> {
        self.history.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/pipeline/trigger", post(trigger))
        .route("/pipeline/status", get(status))
        .route("/report/latest", get(latest_report))
        .route("/metrics", get(render_metrics))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Clears the running flag even when the run panics.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn trigger(State(state): State<AppState>) -> Response {
    if state
        .running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "status": "busy", "message": "a run is already in progress" })),
        )
            .into_response();
    }

    let guard = RunningGuard(state.running.clone());
    let executor = state.executor.clone();
    let history = state.history.clone();
    tokio::spawn(async move {
        let _guard = guard;
        match executor.execute().await {
            Ok(report) => {
                info!(target: "pipeline", run_id = %report.run_id, "background run stored");
                history.push(report);
            }
            Err(e) => warn!(target: "pipeline", error = ?e, "background run failed"),
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "started" }))).into_response()
}

#[derive(Deserialize)]
struct StatusQuery {
    #[serde(default)]
    last: Option<usize>,
}

#[derive(serde::Serialize)]
struct StatusOut {
    running: bool,
    runs: Vec<RunSummary>,
}

async fn status(State(state): State<AppState>, Query(q): Query<StatusQuery>) -> Json<StatusOut> {
    let n = q.last.unwrap_or(10).clamp(1, 100);
    Json(StatusOut {
        running: state.is_running(),
        runs: state.history.snapshot_last_n(n),
    })
}

async fn latest_report(State(state): State<AppState>) -> Response {
    match state.history.latest() {
        Some(report) => Json(report.as_ref().clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "no finished run yet" })),
        )
            .into_response(),
    }
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(h) => h.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
