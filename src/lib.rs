// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod history;
pub mod metrics;
pub mod storage;

// Crawl, video sampling and text ingestion
pub mod ingest;
pub mod video;

// Classifier/sentiment/palette collaborators
pub mod analyze;

// Fusion, ranking, market gate, run orchestration
pub mod evidence;
pub mod handoff;
pub mod market;
pub mod pipeline;
pub mod ranking;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::evidence::{EvidenceAggregator, Vocabulary};
pub use crate::pipeline::{RunReport, TrendPipeline};
pub use crate::ranking::{RankedCandidate, TrendRanker};
