// src/analyze/http.rs
//! Client for the inference server that hosts the zero-shot image/text
//! classifier, the sentiment model and the palette extractor.
//!
//! Endpoints (all POST, JSON):
//! - `{base}/classify`  `{ image_base64 | text, categories: [{name, labels}] }`
//!   -> `{ results: { <category>: { label, score, all_scores } } }`
//! - `{base}/sentiment` `{ text }` -> `{ label, score }`
//! - `{base}/palette`   `{ image_base64, n_colors }` -> `{ colors: [{ rgb, percentage }] }`

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::analyze::palette::{ColorSwatch, PaletteExtractor};
use crate::analyze::sentiment::{Sentiment, SentimentScorer};
use crate::analyze::{
    CategoryRequest, Classification, ClassificationMap, Classifier, ClassifierError,
    ClassifierInput,
};
use crate::ingest::MAX_TEXT_CHARS;

#[derive(Clone)]
pub struct HttpInference {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    palette_colors: usize,
}

#[derive(Serialize)]
struct CategoryBody<'a> {
    name: &'a str,
    labels: &'a [String],
}

#[derive(Serialize)]
struct ClassifyBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    categories: Vec<CategoryBody<'a>>,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    results: HashMap<String, Classification>,
}

#[derive(Deserialize)]
struct SentimentResponse {
    label: String,
}

#[derive(Deserialize)]
struct PaletteColor {
    rgb: [u8; 3],
    percentage: f32,
}

#[derive(Deserialize)]
struct PaletteResponse {
    #[serde(default)]
    colors: Vec<PaletteColor>,
}

impl HttpInference {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fabric-trend-radar/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            palette_colors: 3,
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_palette_colors(mut self, n: usize) -> Self {
        self.palette_colors = n.max(1);
        self
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ClassifierError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut req = self.http.post(&url).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }
        resp.json::<R>()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))
    }
}

fn truncate_chars(text: &str) -> &str {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl Classifier for HttpInference {
    async fn classify(
        &self,
        input: ClassifierInput<'_>,
        request: &CategoryRequest,
    ) -> Result<ClassificationMap, ClassifierError> {
        if request.is_empty() {
            return Ok(ClassificationMap::new());
        }
        let categories = request
            .iter()
            .map(|(name, labels)| CategoryBody { name, labels })
            .collect();
        let body = match input {
            ClassifierInput::Image(bytes) => ClassifyBody {
                image_base64: Some(B64.encode(bytes)),
                text: None,
                categories,
            },
            ClassifierInput::Text(text) => ClassifyBody {
                image_base64: None,
                text: Some(truncate_chars(text)),
                categories,
            },
        };
        let resp: ClassifyResponse = self.post("classify", &body).await?;
        // Only categories that were asked for.
        Ok(resp
            .results
            .into_iter()
            .filter(|(cat, _)| request.labels(cat).is_some())
            .collect())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[async_trait]
impl SentimentScorer for HttpInference {
    async fn score(&self, text: &str) -> Result<Sentiment, ClassifierError> {
        let body = serde_json::json!({ "text": truncate_chars(text) });
        let resp: SentimentResponse = self.post("sentiment", &body).await?;
        Ok(Sentiment::from_label(&resp.label))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[async_trait]
impl PaletteExtractor for HttpInference {
    async fn extract(&self, payload: &[u8]) -> Result<Vec<ColorSwatch>, ClassifierError> {
        let body = serde_json::json!({
            "image_base64": B64.encode(payload),
            "n_colors": self.palette_colors,
        });
        let resp: PaletteResponse = self.post("palette", &body).await?;
        let mut out: Vec<ColorSwatch> = resp
            .colors
            .into_iter()
            .map(|c| ColorSwatch::from_rgb((c.rgb[0], c.rgb[1], c.rgb[2]), c.percentage))
            .collect();
        out.sort_by(|a, b| {
            b.percentage
                .partial_cmp(&a.percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
