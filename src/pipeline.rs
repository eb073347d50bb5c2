// src/pipeline.rs
//! One full run: collect every source in order, fold the accepted assets into
//! evidence, rank, gate on market interest and hand the result off.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

use crate::evidence::{Analyzers, EvidenceAggregator, TextOutcome, VisualOutcome, Vocabulary};
use crate::handoff::DynHandoff;
use crate::ingest::ensure_metrics_described;
use crate::ingest::types::DynSource;
use crate::market::MarketGate;
use crate::ranking::{RankedCandidate, TrendRanker};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub visual_accepted: usize,
    pub texts_accepted: usize,
    /// Assets that added at least one vote.
    pub counted: usize,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceSummary>,
    /// Ranked and gated, best first.
    pub candidates: Vec<RankedCandidate>,
    /// Names dropped as DECLINING.
    pub declined: Vec<String>,
}

impl RunReport {
    pub fn empty() -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            finished_at: now,
            sources: Vec::new(),
            candidates: Vec::new(),
            declined: Vec::new(),
        }
    }

    pub fn source_errors(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }
}

/// Something the API can trigger.
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    async fn execute(&self) -> Result<RunReport>;
}

pub struct TrendPipeline {
    sources: Vec<DynSource>,
    analyzers: Analyzers,
    vocabulary: Vocabulary,
    ranker: TrendRanker,
    gate: MarketGate,
    handoff: Option<DynHandoff>,
}

impl TrendPipeline {
    pub fn new(
        sources: Vec<DynSource>,
        analyzers: Analyzers,
        vocabulary: Vocabulary,
        gate: MarketGate,
    ) -> Self {
        Self {
            sources,
            analyzers,
            vocabulary,
            ranker: TrendRanker::default(),
            gate,
            handoff: None,
        }
    }

    pub fn with_handoff(mut self, sink: DynHandoff) -> Self {
        self.handoff = Some(sink);
        self
    }

    pub fn with_ranker(mut self, ranker: TrendRanker) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub async fn run(&self) -> RunReport {
        ensure_metrics_described();
        let t0 = Instant::now();
        let mut report = RunReport::empty();
        let mut evidence = EvidenceAggregator::new(self.vocabulary.clone());

        info!(target: "pipeline", run_id = %report.run_id, sources = self.sources.len(), "run started");

        for source in &self.sources {
            let summary = self.collect_source(source, &mut evidence).await;
            report.sources.push(summary);
        }

        let ranked = self.ranker.rank(&evidence);
        info!(target: "pipeline", ranked = ranked.len(), "ranking done");

        let gated = self.gate.apply(ranked).await;
        report.candidates = gated.passed;
        report.declined = gated.declined;
        report.finished_at = Utc::now();

        if let Some(sink) = &self.handoff {
            if let Err(e) = sink.deliver(&report).await {
                warn!(target: "pipeline", sink = sink.name(), error = ?e, "handoff failed");
            }
        }

        histogram!("pipeline_run_ms").record(t0.elapsed().as_millis() as f64);
        gauge!("pipeline_last_run_ts").set(report.finished_at.timestamp() as f64);
        info!(
            target: "pipeline",
            run_id = %report.run_id,
            candidates = report.candidates.len(),
            declined = report.declined.len(),
            source_errors = report.source_errors(),
            "run finished"
        );
        report
    }

    async fn collect_source(
        &self,
        source: &DynSource,
        evidence: &mut EvidenceAggregator,
    ) -> SourceSummary {
        let t0 = Instant::now();
        let mut summary = SourceSummary {
            name: source.name().to_string(),
            ..SourceSummary::default()
        };

        match source.collect().await {
            Ok(yielded) => {
                summary.visual_accepted = yielded.visual.len();
                summary.texts_accepted = yielded.text.len();
                for asset in &yielded.visual {
                    if let Some(VisualOutcome::Counted { .. }) =
                        evidence.ingest_visual(&self.analyzers, asset).await
                    {
                        summary.counted += 1;
                    }
                }
                for text in &yielded.text {
                    if let Some(TextOutcome::Counted { .. }) =
                        evidence.ingest_text(&self.analyzers, text).await
                    {
                        summary.counted += 1;
                    }
                }
                info!(
                    target: "pipeline",
                    source = %summary.name,
                    visual = summary.visual_accepted,
                    text = summary.texts_accepted,
                    counted = summary.counted,
                    "source done"
                );
            }
            Err(e) => {
                counter!("pipeline_source_errors_total").increment(1);
                warn!(target: "pipeline", source = %summary.name, error = ?e, "source failed");
                summary.error = Some(format!("{e:#}"));
            }
        }

        summary.elapsed_ms = t0.elapsed().as_millis() as u64;
        summary
    }
}

#[async_trait]
impl PipelineExecutor for TrendPipeline {
    async fn execute(&self) -> Result<RunReport> {
        Ok(self.run().await)
    }
}
