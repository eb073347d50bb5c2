// src/config/mod.rs
pub mod pipeline;

pub use pipeline::{resolve_secret, PipelineConfig};
