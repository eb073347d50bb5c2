// src/market/mod.rs
//! Market-interest gate: per candidate, fetch an interest series, fit a
//! least-squares slope, bucket it into a status and drop DECLINING.

pub mod http;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::ranking::RankedCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendStatus {
    Rising,
    RisingWeak,
    Stable,
    DecliningWeak,
    Declining,
    NoData,
    Error,
}

impl TrendStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrendStatus::Rising => "RISING",
            TrendStatus::RisingWeak => "RISING_WEAK",
            TrendStatus::Stable => "STABLE",
            TrendStatus::DecliningWeak => "DECLINING_WEAK",
            TrendStatus::Declining => "DECLINING",
            TrendStatus::NoData => "NO_DATA",
            TrendStatus::Error => "ERROR",
        }
    }
}

/// Bucket a slope. Rules in order, first match wins:
/// `> 0.5` RISING, `< -0.5` DECLINING, `(-0.2, 0.2)` STABLE,
/// `[0.2, 0.5]` RISING_WEAK, `[-0.5, -0.2]` DECLINING_WEAK.
pub fn classify_slope(m: f64) -> TrendStatus {
    if m > 0.5 {
        TrendStatus::Rising
    } else if m < -0.5 {
        TrendStatus::Declining
    } else if m > -0.2 && m < 0.2 {
        TrendStatus::Stable
    } else if (0.2..=0.5).contains(&m) {
        TrendStatus::RisingWeak
    } else if (-0.5..=-0.2).contains(&m) {
        TrendStatus::DecliningWeak
    } else {
        // NaN
        TrendStatus::Stable
    }
}

/// Ordinary least squares slope of `values` against their index. Non-finite
/// points are dropped; fewer than two points give 0.
pub fn linear_slope(values: &[f64]) -> f64 {
    let pts: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, v)| (i as f64, *v))
        .collect();
    if pts.len() < 2 {
        return 0.0;
    }
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let (num, den) = pts.iter().fold((0.0, 0.0), |(num, den), (x, y)| {
        (num + (x - mean_x) * (y - mean_y), den + (x - mean_x) * (x - mean_x))
    });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no data for term")]
    NoData,

    #[error("rate limited by trend oracle")]
    RateLimited,

    #[error("oracle request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Request(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendQuery {
    pub term: String,
    pub region: String,
    pub window_months: u32,
}

#[async_trait]
pub trait TrendOracle: Send + Sync {
    /// Interest values, oldest first.
    async fn interest(&self, query: &TrendQuery) -> Result<Vec<f64>, OracleError>;
    fn name(&self) -> &'static str;
}

pub type DynOracle = Arc<dyn TrendOracle>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketReading {
    pub status: TrendStatus,
    /// Rounded to 3 decimals; absent without data.
    pub slope: Option<f64>,
    pub mean_interest: Option<f64>,
    pub points: usize,
}

impl MarketReading {
    fn without_data(status: TrendStatus) -> Self {
        Self {
            status,
            slope: None,
            mean_interest: None,
            points: 0,
        }
    }

    pub fn from_series(values: &[f64]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self::without_data(TrendStatus::NoData);
        }
        let slope = linear_slope(values);
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        Self {
            status: classify_slope(slope),
            slope: Some((slope * 1_000.0).round() / 1_000.0),
            mean_interest: Some((mean * 100.0).round() / 100.0),
            points: finite.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    /// Query prefix; the term is `"<topic> <candidate>"`.
    pub topic: String,
    pub region: String,
    pub window_months: u32,
    pub query_delay_ms: u64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            topic: "Tela".into(),
            region: "CO".into(),
            window_months: 12,
            query_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GateOutcome {
    pub passed: Vec<RankedCandidate>,
    /// Names removed as DECLINING.
    pub declined: Vec<String>,
}

pub struct MarketGate {
    oracle: DynOracle,
    settings: MarketSettings,
}

impl MarketGate {
    pub fn new(oracle: DynOracle, settings: MarketSettings) -> Self {
        Self { oracle, settings }
    }

    pub fn query_for(&self, candidate: &str) -> TrendQuery {
        TrendQuery {
            term: format!("{} {}", self.settings.topic.trim(), candidate.trim())
                .trim()
                .to_string(),
            region: self.settings.region.clone(),
            window_months: self.settings.window_months,
        }
    }

    pub async fn read(&self, candidate: &str) -> MarketReading {
        let query = self.query_for(candidate);
        counter!("market_queries_total").increment(1);
        match self.oracle.interest(&query).await {
            Ok(values) => MarketReading::from_series(&values),
            Err(OracleError::NoData) => MarketReading::without_data(TrendStatus::NoData),
            Err(e) => {
                counter!("market_errors_total").increment(1);
                warn!(target: "market", term = %query.term, error = %e, "oracle query failed");
                MarketReading::without_data(TrendStatus::Error)
            }
        }
    }

    /// Annotate every candidate, then drop the DECLINING ones. Order is kept.
    pub async fn apply(&self, candidates: Vec<RankedCandidate>) -> GateOutcome {
        let mut out = GateOutcome::default();
        let delay = Duration::from_millis(self.settings.query_delay_ms);

        for (i, mut candidate) in candidates.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let reading = self.read(&candidate.name).await;
            info!(
                target: "market",
                candidate = %candidate.name,
                status = reading.status.as_str(),
                slope = ?reading.slope,
                "market status"
            );
            candidate.market_status = Some(reading.status);
            candidate.market_slope = reading.slope;
            candidate.mean_interest = reading.mean_interest;

            if reading.status == TrendStatus::Declining {
                out.declined.push(candidate.name);
            } else {
                out.passed.push(candidate);
            }
        }
        out
    }
}
