// src/analyze/mod.rs
//! Classifier seam: category requests, per-category results and the relevance
//! gates used by the image crawl and the frame sampler.
//!
//! Models themselves live behind the `Classifier`, `SentimentScorer` and
//! `PaletteExtractor` traits; this module only shapes requests and reads
//! results.

pub mod http;
pub mod palette;
pub mod sentiment;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub use crate::analyze::palette::{ColorSwatch, DynPalette, KMeansPalette, PaletteExtractor};
pub use crate::analyze::sentiment::{DynSentiment, LexiconSentiment, Sentiment, SentimentScorer};

/// Category names used across the pipeline.
pub const CONTENT_TYPE: &str = "content_type";
pub const FABRIC: &str = "fabric";
pub const TEXTURE: &str = "texture";
pub const FINISH: &str = "finish";

/// Zero-shot text attributes must score strictly above this to count.
pub const TEXT_ATTRIBUTE_MIN_SCORE: f32 = 0.4;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("network error: {0}")]
    Network(String),

    #[error("model server error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("unsupported input: {0}")]
    Unsupported(String),
}

impl From<reqwest::Error> for ClassifierError {
    fn from(err: reqwest::Error) -> Self {
        ClassifierError::Network(err.to_string())
    }
}

/// What gets classified: an encoded image payload or a piece of text.
#[derive(Debug, Clone, Copy)]
pub enum ClassifierInput<'a> {
    Image(&'a [u8]),
    Text(&'a str),
}

/// Ordered `category -> labels` request. Categories with no labels are
/// skipped on insert, never sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryRequest {
    categories: Vec<(String, Vec<String>)>,
}

impl CategoryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style insert. Replaces an existing category of the same name.
    pub fn with<I, S>(mut self, category: &str, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels
            .into_iter()
            .map(Into::into)
            .filter(|l: &String| !l.trim().is_empty())
            .collect();
        self.categories.retain(|(c, _)| c != category);
        if !labels.is_empty() {
            self.categories.push((category.to_string(), labels));
        }
        self
    }

    pub fn labels(&self, category: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, l)| l.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.categories
            .iter()
            .map(|(c, l)| (c.as_str(), l.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Top label of one category plus the full score distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub score: f32,
    #[serde(default)]
    pub all_scores: HashMap<String, f32>,
}

impl Classification {
    /// Pick the best label from a score list. Ties keep the earlier label.
    pub fn from_scores<I, S>(scores: I) -> Option<Self>
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let mut best: Option<(String, f32)> = None;
        let mut all_scores = HashMap::new();
        for (label, score) in scores {
            let label = label.into();
            let better = match &best {
                None => true,
                Some((_, s)) => score > *s,
            };
            if better {
                best = Some((label.clone(), score));
            }
            all_scores.insert(label, score);
        }
        best.map(|(label, score)| Self {
            label,
            score,
            all_scores,
        })
    }
}

pub type ClassificationMap = HashMap<String, Classification>;

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `input` once per requested category. Scores within one
    /// category sum to ~1.
    async fn classify(
        &self,
        input: ClassifierInput<'_>,
        request: &CategoryRequest,
    ) -> Result<ClassificationMap, ClassifierError>;

    fn name(&self) -> &'static str;
}

pub type DynClassifier = Arc<dyn Classifier>;

/// Content-type gate: accept iff the top label is on the allow-list and its
/// score is strictly above `min_score`.
#[derive(Debug, Clone)]
pub struct RelevanceGate {
    positive: Vec<String>,
    negative: Vec<String>,
    min_score: f32,
}

impl RelevanceGate {
    pub const STATIC_IMAGE_MIN_SCORE: f32 = 0.2;
    pub const VIDEO_FRAME_MIN_SCORE: f32 = 0.25;

    pub fn new(positive: Vec<String>, negative: Vec<String>, min_score: f32) -> Self {
        Self {
            positive,
            negative,
            min_score: min_score.clamp(0.0, 1.0),
        }
    }

    /// Gate for crawled still images. The low threshold works because the
    /// negative labels are strong: a weak positive win still rules them out.
    pub fn static_image() -> Self {
        Self::new(
            to_strings(&[
                "editorial fashion photography",
                "street style photography",
                "clothing product photography",
            ]),
            to_strings(&[
                "promotional graphic with text",
                "digital collage with text",
                "infographic layout",
                "text overlay",
            ]),
            Self::STATIC_IMAGE_MIN_SCORE,
        )
    }

    /// Gate for sampled video frames.
    pub fn video_frame() -> Self {
        Self::new(
            to_strings(&[
                "person wearing clothes",
                "fashion outfit",
                "editorial fashion photography",
                "street style photography",
            ]),
            to_strings(&[
                "promotional graphic with text",
                "digital collage with text",
                "text overlay",
                "blurry or low quality image",
                "close-up of face only",
            ]),
            Self::VIDEO_FRAME_MIN_SCORE,
        )
    }

    pub fn min_score(&self) -> f32 {
        self.min_score
    }

    /// Single `content_type` category: positives first, then negatives.
    pub fn request(&self) -> CategoryRequest {
        CategoryRequest::new().with(
            CONTENT_TYPE,
            self.positive.iter().chain(self.negative.iter()).cloned(),
        )
    }

    pub fn accepts(&self, results: &ClassificationMap) -> bool {
        match results.get(CONTENT_TYPE) {
            Some(c) => self.positive.iter().any(|p| p == &c.label) && c.score > self.min_score,
            None => false,
        }
    }

    pub async fn evaluate(
        &self,
        classifier: &dyn Classifier,
        payload: &[u8],
    ) -> Result<bool, ClassifierError> {
        let results = classifier
            .classify(ClassifierInput::Image(payload), &self.request())
            .await?;
        Ok(self.accepts(&results))
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Per-category text attributes after the 0.4 confidence cut. A category that
/// was asked for but did not clear the cut is present as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextAttributes {
    by_category: HashMap<String, Option<Classification>>,
}

impl TextAttributes {
    pub fn from_results(request: &CategoryRequest, mut results: ClassificationMap) -> Self {
        let mut by_category = HashMap::new();
        for (category, _) in request.iter() {
            let kept = results
                .remove(category)
                .filter(|c| c.score > TEXT_ATTRIBUTE_MIN_SCORE);
            by_category.insert(category.to_string(), kept);
        }
        Self { by_category }
    }

    pub fn get(&self, category: &str) -> Option<&Classification> {
        self.by_category.get(category).and_then(Option::as_ref)
    }
}

/// Zero-shot attributes for a text, with the text confidence cut applied.
pub async fn classify_text_attributes(
    classifier: &dyn Classifier,
    text: &str,
    request: &CategoryRequest,
) -> Result<TextAttributes, ClassifierError> {
    let results = classifier
        .classify(ClassifierInput::Text(text), request)
        .await?;
    Ok(TextAttributes::from_results(request, results))
}
