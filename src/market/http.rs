// src/market/http.rs
//! JSON trend service: `GET {base}/interest?term=..&geo=..&months=..`
//! -> `{ "values": [..] }`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::market::{OracleError, TrendOracle, TrendQuery};

#[derive(Debug, Deserialize)]
struct InterestResponse {
    #[serde(default)]
    values: Vec<f64>,
}

pub struct HttpTrendOracle {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTrendOracle {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fabric-trend-radar/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}

#[async_trait]
impl TrendOracle for HttpTrendOracle {
    async fn interest(&self, query: &TrendQuery) -> Result<Vec<f64>, OracleError> {
        let months = query.window_months.to_string();
        let mut req = self
            .http
            .get(format!("{}/interest", self.base_url))
            .query(&[
                ("term", query.term.as_str()),
                ("geo", query.region.as_str()),
                ("months", months.as_str()),
            ]);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        match resp.status().as_u16() {
            429 => return Err(OracleError::RateLimited),
            404 => return Err(OracleError::NoData),
            s if !(200..300).contains(&s) => {
                return Err(OracleError::Request(format!("status {s}")))
            }
            _ => {}
        }
        let body: InterestResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;
        if body.values.is_empty() {
            return Err(OracleError::NoData);
        }
        Ok(body.values)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
