// src/video/mod.rs
pub mod ffmpeg;
pub mod frame;
pub mod histogram;
pub mod hunt;
pub mod sampler;
pub mod ytdlp;

use thiserror::Error;

pub use frame::Frame;
pub use hunt::{VideoCrawlAdapter, VideoEntry, VideoSource};
pub use sampler::{FrameSampler, FrameSource, SamplerConfig, VideoVerdict};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} failed: {message}")]
    Tool {
        tool: &'static str,
        message: String,
    },

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("corrupt media: {0}")]
    Corrupt(String),
}
