// tests/common/mod.rs
//
// Scripted in-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use fabric_trend_radar::analyze::{
    CategoryRequest, Classification, ClassificationMap, Classifier, ClassifierError,
    ClassifierInput, ColorSwatch, PaletteExtractor, Sentiment, SentimentScorer, CONTENT_TYPE,
    FABRIC,
};
use fabric_trend_radar::ingest::fetch::{FetchError, Fetcher};
use fabric_trend_radar::ingest::session::{ScrollSession, SessionError, SessionLauncher};
use fabric_trend_radar::ingest::types::RawAssetRef;
use fabric_trend_radar::market::{OracleError, TrendOracle, TrendQuery};
use fabric_trend_radar::video::frame::Frame;
use fabric_trend_radar::video::sampler::FrameSource;
use fabric_trend_radar::video::DecodeError;

pub fn cls(label: &str, score: f32) -> Classification {
    Classification {
        label: label.to_string(),
        score,
        all_scores: HashMap::new(),
    }
}

/// Per-input scripted answers. Image payloads and texts are looked up by
/// their UTF-8 content; unknown inputs get `default`. Only the categories the
/// caller asked for are returned.
#[derive(Default)]
pub struct ScriptedClassifier {
    answers: HashMap<String, ClassificationMap>,
    default: ClassificationMap,
    pub calls: Mutex<usize>,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, key: &str, category: &str, label: &str, score: f32) -> Self {
        self.answers
            .entry(key.to_string())
            .or_default()
            .insert(category.to_string(), cls(label, score));
        self
    }

    pub fn default_answer(mut self, category: &str, label: &str, score: f32) -> Self {
        self.default.insert(category.to_string(), cls(label, score));
        self
    }

    /// Accept every image through the content gate.
    pub fn relevant_everything() -> Self {
        Self::new().default_answer(CONTENT_TYPE, "editorial fashion photography", 0.9)
    }

    /// `payload` passes the content gate and votes `fabric` with `score`.
    pub fn fabric_image(self, payload: &str, fabric: &str, score: f32) -> Self {
        self.answer(payload, CONTENT_TYPE, "editorial fashion photography", 0.9)
            .answer(payload, FABRIC, fabric, score)
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(
        &self,
        input: ClassifierInput<'_>,
        request: &CategoryRequest,
    ) -> Result<ClassificationMap, ClassifierError> {
        *self.calls.lock().unwrap() += 1;
        let key = match input {
            ClassifierInput::Image(bytes) => String::from_utf8_lossy(bytes).to_string(),
            ClassifierInput::Text(text) => text.to_string(),
        };
        let scripted = self.answers.get(&key).unwrap_or(&self.default);
        Ok(request
            .iter()
            .filter_map(|(cat, _)| scripted.get(cat).map(|c| (cat.to_string(), c.clone())))
            .collect())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub struct FixedSentiment(pub Sentiment);

#[async_trait]
impl SentimentScorer for FixedSentiment {
    async fn score(&self, _text: &str) -> Result<Sentiment, ClassifierError> {
        Ok(self.0)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub struct FixedPalette(pub Vec<ColorSwatch>);

#[async_trait]
impl PaletteExtractor for FixedPalette {
    async fn extract(&self, _payload: &[u8]) -> Result<Vec<ColorSwatch>, ClassifierError> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// URL -> body. Unknown URLs answer 404. Every request is recorded.
#[derive(Default)]
pub struct MapFetcher {
    bodies: HashMap<String, Vec<u8>>,
    pub requested: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.as_bytes().to_vec());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.bodies.get(url).cloned().ok_or(FetchError::Status {
            status: 404,
            url: url.to_string(),
        })
    }
}

/// Plays back one page of refs per `advance`, then empty pages.
pub struct ScriptedSession {
    pages: VecDeque<Vec<RawAssetRef>>,
    fail_after: Option<usize>,
    fail_once_at: Option<usize>,
    steps: usize,
}

impl ScriptedSession {
    pub fn new(pages: Vec<Vec<&str>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|p| p.into_iter().map(RawAssetRef::image).collect())
                .collect(),
            fail_after: None,
            fail_once_at: None,
            steps: 0,
        }
    }

    /// Every step after `n` successful ones fails.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// The step after `n` successful ones fails once; the next one proceeds.
    pub fn flaky_at(mut self, n: usize) -> Self {
        self.fail_once_at = Some(n);
        self
    }
}

#[async_trait]
impl ScrollSession for ScriptedSession {
    async fn advance(&mut self) -> Result<Vec<RawAssetRef>, SessionError> {
        if self.fail_once_at == Some(self.steps) {
            self.fail_once_at = None;
            return Err(SessionError::Render("render timed out".into()));
        }
        if self.fail_after == Some(self.steps) {
            return Err(SessionError::Render("page crashed".into()));
        }
        self.steps += 1;
        Ok(self.pages.pop_front().unwrap_or_default())
    }
}

/// Launcher that hands out a fresh scripted session per query, or fails.
pub struct ScriptedLauncher {
    pub label: &'static str,
    pages: Option<Vec<Vec<String>>>,
    pub launches: Mutex<usize>,
}

impl ScriptedLauncher {
    pub fn serving(label: &'static str, pages: Vec<Vec<&str>>) -> Self {
        Self {
            label,
            pages: Some(
                pages
                    .into_iter()
                    .map(|p| p.into_iter().map(str::to_string).collect())
                    .collect(),
            ),
            launches: Mutex::new(0),
        }
    }

    pub fn broken(label: &'static str) -> Self {
        Self {
            label,
            pages: None,
            launches: Mutex::new(0),
        }
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    fn strategy(&self) -> &'static str {
        self.label
    }

    async fn launch(&self, _query: &str) -> Result<Box<dyn ScrollSession>, SessionError> {
        *self.launches.lock().unwrap() += 1;
        match &self.pages {
            Some(pages) => {
                let pages = pages
                    .iter()
                    .map(|p| p.iter().map(String::as_str).collect())
                    .collect();
                Ok(Box::new(ScriptedSession::new(pages)))
            }
            None => Err(SessionError::Launch {
                strategy: self.label,
                message: "no browser".into(),
            }),
        }
    }
}

/// Fully saturated primaries and secondaries; each lands in its own hue bin.
pub const HUES: [[u8; 3]; 6] = [
    [255, 0, 0],
    [255, 255, 0],
    [0, 255, 0],
    [0, 255, 255],
    [0, 0, 255],
    [255, 0, 255],
];

/// In-memory decoded video at 1 fps.
pub struct VecFrames {
    frames: VecDeque<Frame>,
    fail_at_end: bool,
}

impl VecFrames {
    pub fn solid(colors: &[[u8; 3]]) -> Self {
        Self {
            frames: colors
                .iter()
                .enumerate()
                .map(|(i, c)| Frame::filled(i as u64, 8, 8, *c))
                .collect(),
            fail_at_end: false,
        }
    }

    /// The read after the last frame is a decode error instead of end of stream.
    pub fn truncated(mut self) -> Self {
        self.fail_at_end = true;
        self
    }
}

#[async_trait]
impl FrameSource for VecFrames {
    fn frame_rate(&self) -> f64 {
        1.0
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        match self.frames.pop_front() {
            Some(f) => Ok(Some(f)),
            None if self.fail_at_end => Err(DecodeError::Tool {
                tool: "ffmpeg",
                message: "unexpected end of stream".into(),
            }),
            None => Ok(None),
        }
    }
}

/// Term -> interest series. Unknown terms fail the request.
#[derive(Default)]
pub struct ScriptedOracle {
    series: HashMap<String, Result<Vec<f64>, &'static str>>,
    pub queries: Mutex<Vec<TrendQuery>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series(mut self, term: &str, values: &[f64]) -> Self {
        self.series.insert(term.to_string(), Ok(values.to_vec()));
        self
    }

    pub fn no_data(mut self, term: &str) -> Self {
        self.series.insert(term.to_string(), Err("no_data"));
        self
    }

    pub fn queried_terms(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.term.clone())
            .collect()
    }
}

#[async_trait]
impl TrendOracle for ScriptedOracle {
    async fn interest(&self, query: &TrendQuery) -> Result<Vec<f64>, OracleError> {
        self.queries.lock().unwrap().push(query.clone());
        match self.series.get(&query.term) {
            Some(Ok(v)) => Ok(v.clone()),
            Some(Err(_)) => Err(OracleError::NoData),
            None => Err(OracleError::Request("connection refused".into())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Series of `n` points rising by `slope` per step.
pub fn line(slope: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| 50.0 + slope * i as f64).collect()
}

pub fn shared<T>(v: T) -> Arc<T> {
    Arc::new(v)
}
