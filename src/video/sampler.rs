// src/video/sampler.rs
//! Video -> accepted frames: fixed-period sampling, histogram dedup against
//! frames already accepted from the same video, relevance gate, and the
//! per-video minimum-yield gate.

use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analyze::{DynClassifier, RelevanceGate};
use crate::ingest::types::{AcceptedAsset, AssetKind};
use crate::storage::DynStorage;
use crate::video::frame::{encode_ppm, Frame};
use crate::video::histogram::HsHistogram;
use crate::video::DecodeError;

pub const DEFAULT_FPS: f64 = 30.0;
pub const DUPLICATE_CORRELATION: f64 = 0.85;
pub const MIN_ACCEPTED_FRAMES: usize = 5;

/// Sequential decoder over one video.
#[async_trait]
pub trait FrameSource: Send {
    /// Frames per second; 0 or non-finite when the stream does not say.
    fn frame_rate(&self) -> f64;

    /// Next frame in stream order, `None` at end of stream.
    async fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    pub period: Duration,
}

impl SamplerConfig {
    pub fn short_form() -> Self {
        Self {
            period: Duration::from_millis(1_500),
        }
    }

    pub fn generic() -> Self {
        Self {
            period: Duration::from_secs(2),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::short_form()
    }
}

/// Frames between samples: `fps * period`, at least 1. Unreadable rates fall
/// back to 30 fps.
pub fn frame_interval(fps: f64, period: Duration) -> u64 {
    let fps = if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        DEFAULT_FPS
    };
    ((fps * period.as_secs_f64()) as u64).max(1)
}

#[derive(Debug)]
pub enum VideoVerdict {
    Accepted(Vec<AcceptedAsset>),
    /// Fewer than the minimum frames survived; none are kept.
    Rejected { accepted: usize },
}

impl VideoVerdict {
    pub fn frames(&self) -> &[AcceptedAsset] {
        match self {
            VideoVerdict::Accepted(f) => f,
            VideoVerdict::Rejected { .. } => &[],
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, VideoVerdict::Accepted(_))
    }
}

pub struct FrameSampler {
    source: String,
    config: SamplerConfig,
    gate: RelevanceGate,
    classifier: DynClassifier,
    storage: DynStorage,
}

impl FrameSampler {
    pub fn new(
        source: impl Into<String>,
        config: SamplerConfig,
        classifier: DynClassifier,
        storage: DynStorage,
    ) -> Self {
        Self {
            source: source.into(),
            config,
            gate: RelevanceGate::video_frame(),
            classifier,
            storage,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub async fn sample(
        &self,
        frames: &mut dyn FrameSource,
        video_id: &str,
        tag: &str,
    ) -> VideoVerdict {
        let interval = frame_interval(frames.frame_rate(), self.config.period);
        let mut accepted: Vec<AcceptedAsset> = Vec::new();
        let mut accepted_hists: Vec<HsHistogram> = Vec::new();
        let mut position: u64 = 0;

        loop {
            let frame = match frames.next_frame().await {
                Ok(Some(f)) => f,
                Ok(None) => break,
                // A truncated stream is judged on the frames read so far.
                Err(e) => {
                    warn!(target: "frames", video_id, error = %e, "decode failed, stopping scan");
                    break;
                }
            };
            let at = position;
            position += 1;
            if at % interval != 0 {
                continue;
            }
            counter!("frames_sampled_total").increment(1);

            let hist = HsHistogram::of_frame(&frame);
            if accepted_hists
                .iter()
                .any(|h| hist.correlation(h) > DUPLICATE_CORRELATION)
            {
                counter!("frames_duplicate_total").increment(1);
                debug!(target: "frames", video_id, frame = at, "near-duplicate frame skipped");
                continue;
            }

            let payload = encode_ppm(&frame);
            match self.gate.evaluate(self.classifier.as_ref(), &payload).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(target: "frames", video_id, frame = at, error = %e, "frame classify failed");
                    continue;
                }
            }

            let name = format!("{}_{}_{}.ppm", self.source, sanitize(video_id), at);
            let stored_url = match self.storage.store(&payload, &name).await {
                Ok(u) => u,
                Err(e) => {
                    warn!(target: "frames", video_id, frame = at, error = %e, "frame store failed");
                    continue;
                }
            };

            counter!("frames_accepted_total").increment(1);
            accepted_hists.push(hist);
            accepted.push(AcceptedAsset {
                kind: AssetKind::VideoFrame,
                source: self.source.clone(),
                canonical_url: stored_url.clone(),
                stored_url,
                query: tag.to_string(),
                parent_video: Some(video_id.to_string()),
                captured_at: chrono::Utc::now(),
                payload: Arc::new(payload),
            });
        }

        if accepted.len() < MIN_ACCEPTED_FRAMES {
            counter!("videos_rejected_total").increment(1);
            info!(target: "frames", video_id, accepted = accepted.len(), "video below frame minimum, discarded");
            VideoVerdict::Rejected {
                accepted: accepted.len(),
            }
        } else {
            counter!("videos_accepted_total").increment(1);
            info!(target: "frames", video_id, accepted = accepted.len(), "video accepted");
            VideoVerdict::Accepted(accepted)
        }
    }
}

/// Keep storage names to `[A-Za-z0-9_-]`.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
