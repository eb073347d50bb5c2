// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /pipeline/trigger (202, then 409 while a run is in flight)
// - GET /pipeline/status
// - GET /report/latest (404 before any run, 200 after)
// - GET /metrics without a recorder

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as Json;
use http::{Request, StatusCode};
use shuttle_axum::axum::{
    body::{self, Body},
    Router,
};
use tokio::sync::Notify;
use tower::ServiceExt as _; // for `oneshot`

use fabric_trend_radar::api::{self, AppState};
use fabric_trend_radar::pipeline::{PipelineExecutor, RunReport};

const BODY_LIMIT: usize = 1024 * 1024;

/// Finishes a run each time it is released.
struct GatedExecutor {
    release: Notify,
}

#[async_trait]
impl PipelineExecutor for GatedExecutor {
    async fn execute(&self) -> Result<RunReport> {
        self.release.notified().await;
        let mut report = RunReport::empty();
        report.declined.push("Denim".into());
        Ok(report)
    }
}

fn app(state: &AppState) -> Router {
    api::router(state.clone())
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

async fn wait_for_runs(state: &AppState, n: usize) {
    for _ in 0..200 {
        if state.history().len() >= n && !state.is_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("background run did not finish");
}

#[tokio::test]
async fn health_returns_ok() {
    let state = AppState::new(
        Arc::new(GatedExecutor {
            release: Notify::new(),
        }),
        5,
    );
    let (status, body) = send(app(&state), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap().trim(), "OK");
}

#[tokio::test]
async fn trigger_runs_once_and_publishes_the_report() {
    let exec = Arc::new(GatedExecutor {
        release: Notify::new(),
    });
    let state = AppState::new(exec.clone(), 5);

    let (status, _) = send(app(&state), "GET", "/report/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(app(&state), "POST", "/pipeline/trigger").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["status"], "started");
    assert!(state.is_running());

    let (status, _) = send(app(&state), "POST", "/pipeline/trigger").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(app(&state), "GET", "/pipeline/status").await;
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["running"], true);
    assert_eq!(v["runs"].as_array().unwrap().len(), 0);

    exec.release.notify_one();
    wait_for_runs(&state, 1).await;

    let (status, body) = send(app(&state), "GET", "/report/latest").await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["declined"], serde_json::json!(["Denim"]));
    assert!(v["run_id"].as_str().is_some());

    let (_, body) = send(app(&state), "GET", "/pipeline/status?last=1").await;
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["running"], false);
    assert_eq!(v["runs"][0]["declined"], 1);

    // A new trigger is accepted once the previous run is done.
    let (status, _) = send(app(&state), "POST", "/pipeline/trigger").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    exec.release.notify_one();
    wait_for_runs(&state, 2).await;
}

#[tokio::test]
async fn metrics_without_recorder_is_unavailable() {
    let state = AppState::new(
        Arc::new(GatedExecutor {
            release: Notify::new(),
        }),
        5,
    );
    let (status, _) = send(app(&state), "GET", "/metrics").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
