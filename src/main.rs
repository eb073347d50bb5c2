//! Fabric Trend Radar: binary entrypoint
//! Loads config, wires the pipeline and serves the trigger/report API.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fabric_trend_radar::api::{self, AppState};
use fabric_trend_radar::bootstrap::build_pipeline;
use fabric_trend_radar::config::PipelineConfig;
use fabric_trend_radar::metrics::Metrics;

/// Compact logs by default, JSON when `LOG_FORMAT=json`. `RUST_LOG` wins over
/// the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fabric_trend_radar=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    // Shuttle may already own the global subscriber; ignore that case.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load_default().context("loading pipeline config")?;
    let metrics = Metrics::init()?;
    let pipeline = build_pipeline(&cfg).context("building pipeline")?;

    let state = AppState::new(Arc::new(pipeline), cfg.handoff.history_cap)
        .with_metrics(metrics.handle.clone());
    info!(target: "pipeline", "api ready");

    Ok(api::router(state).into())
}
