// src/ranking.rs
use serde::Serialize;

use crate::evidence::{EvidenceAggregator, FabricEvidence};
use crate::market::TrendStatus;

pub const TOP_K: usize = 5;
pub const MAX_COLORS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    /// 1-based.
    pub rank: usize,
    pub name: String,
    pub vote_count: u32,
    pub mean_confidence: f32,
    pub evidence: FabricEvidence,
    /// Set by the market gate.
    pub market_status: Option<TrendStatus>,
    pub market_slope: Option<f64>,
    pub mean_interest: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct TrendRanker {
    top_k: usize,
    max_colors: usize,
}

impl Default for TrendRanker {
    fn default() -> Self {
        Self {
            top_k: TOP_K,
            max_colors: MAX_COLORS,
        }
    }
}

impl TrendRanker {
    pub fn new(top_k: usize, max_colors: usize) -> Self {
        Self { top_k, max_colors }
    }

    /// Top candidates by votes. The sort is stable over first-vote order, so
    /// ties rank by insertion; candidates without votes never rank.
    pub fn rank(&self, evidence: &EvidenceAggregator) -> Vec<RankedCandidate> {
        let mut pool: Vec<(&str, &FabricEvidence)> = evidence
            .candidates()
            .filter(|(_, ev)| ev.vote_count > 0)
            .collect();
        pool.sort_by(|a, b| b.1.vote_count.cmp(&a.1.vote_count));

        pool.into_iter()
            .take(self.top_k)
            .enumerate()
            .map(|(i, (name, ev))| RankedCandidate {
                rank: i + 1,
                name: name.to_string(),
                vote_count: ev.vote_count,
                mean_confidence: ev.mean_confidence(),
                evidence: ev.assembled(self.max_colors),
                market_status: None,
                market_slope: None,
                mean_interest: None,
            })
            .collect()
    }
}
