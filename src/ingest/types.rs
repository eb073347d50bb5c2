// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    VideoFrame,
    Text,
}

/// One reference observed on a source page, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawAssetRef {
    pub source_url: String,
    pub kind: AssetKind,
}

impl RawAssetRef {
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            source_url: url.into(),
            kind: AssetKind::Image,
        }
    }
}

/// Image or frame that passed the relevance gate and was stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedAsset {
    pub kind: AssetKind,
    pub source: String,
    /// First ladder candidate that fetched; for frames, the stored frame URL.
    pub canonical_url: String,
    pub stored_url: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_video: Option<String>,
    pub captured_at: DateTime<Utc>,
    /// Payload kept in memory for the evidence pass; not serialized.
    #[serde(skip)]
    pub payload: Arc<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextAsset {
    pub source: String,
    pub url: Option<String>,
    pub stored_url: Option<String>,
    /// Normalized, capped text.
    pub text: String,
    pub captured_at: DateTime<Utc>,
}

/// What one source contributed to a run.
#[derive(Debug, Clone, Default)]
pub struct SourceYield {
    pub visual: Vec<AcceptedAsset>,
    pub text: Vec<TextAsset>,
}

impl SourceYield {
    pub fn is_empty(&self) -> bool {
        self.visual.is_empty() && self.text.is_empty()
    }
}

/// A configured source (image hunt, video hunt, text feed). An `Err` means the
/// source could not start at all; per-asset problems are absorbed inside.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn collect(&self) -> Result<SourceYield>;
    fn name(&self) -> &str;
}

pub type DynSource = Arc<dyn SourceAdapter>;
