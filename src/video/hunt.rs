// src/video/hunt.rs
//! Video source adapter: search, keep short clips, sample each until enough
//! videos pass the frame gate.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::ingest::types::{SourceAdapter, SourceYield};
use crate::video::sampler::{FrameSampler, FrameSource, VideoVerdict};
use crate::video::DecodeError;

/// Search buffer per wanted video.
pub const SEARCH_BUFFER_FACTOR: usize = 10;
/// Clips must be strictly shorter than this (seconds).
pub const MAX_DURATION_SECS: f64 = 120.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

impl VideoEntry {
    pub fn is_short_clip(&self) -> bool {
        matches!(self.duration_secs, Some(d) if d > 0.0 && d < MAX_DURATION_SECS)
    }
}

#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn search(&self, tag: &str, max_results: usize) -> Result<Vec<VideoEntry>, DecodeError>;

    async fn open(&self, entry: &VideoEntry) -> Result<Box<dyn FrameSource>, DecodeError>;

    fn name(&self) -> &str;
}

pub type DynVideoSource = Arc<dyn VideoSource>;

pub struct VideoCrawlAdapter {
    videos: DynVideoSource,
    sampler: FrameSampler,
    tags: Vec<String>,
    limit: usize,
}

impl VideoCrawlAdapter {
    pub fn new(videos: DynVideoSource, sampler: FrameSampler, tags: Vec<String>, limit: usize) -> Self {
        Self {
            videos,
            sampler,
            tags,
            limit,
        }
    }
}

#[async_trait]
impl SourceAdapter for VideoCrawlAdapter {
    async fn collect(&self) -> Result<SourceYield> {
        let mut out = SourceYield::default();
        // Counted across tags: `limit` bounds the whole source.
        let mut accepted_videos = 0usize;

        for tag in &self.tags {
            if accepted_videos >= self.limit {
                break;
            }
            let remaining = self.limit - accepted_videos;
            let entries = match self
                .videos
                .search(tag, remaining.saturating_mul(SEARCH_BUFFER_FACTOR))
                .await
            {
                Ok(e) => e,
                Err(e) if out.visual.is_empty() => {
                    return Err(anyhow!("{}: search failed: {}", self.name(), e))
                }
                Err(e) => {
                    warn!(target: "frames", source = self.name(), tag, error = %e, "search failed, keeping partial yield");
                    break;
                }
            };

            let before = accepted_videos;
            for entry in entries.iter().filter(|e| e.is_short_clip()) {
                if accepted_videos >= self.limit {
                    break;
                }
                let mut frames = match self.videos.open(entry).await {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(target: "frames", video_id = %entry.id, error = %e, "video could not be opened");
                        continue;
                    }
                };
                match self.sampler.sample(frames.as_mut(), &entry.id, tag).await {
                    VideoVerdict::Accepted(assets) => {
                        accepted_videos += 1;
                        out.visual.extend(assets);
                    }
                    VideoVerdict::Rejected { .. } => {}
                }
            }
            info!(target: "frames", source = self.name(), tag, videos = accepted_videos - before, "video hunt finished");
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        self.sampler.source()
    }
}
