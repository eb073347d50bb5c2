// src/ingest/crawl.rs
//! Bounded scroll crawl: raw/canonical/content dedup, URL ladder, relevance
//! gate, storage.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use metrics::counter;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analyze::{DynClassifier, RelevanceGate};
use crate::ingest::fetch::DynFetcher;
use crate::ingest::ladder::LadderRules;
use crate::ingest::session::{open_session, DynLauncher, ScrollSession, SessionOutcome};
use crate::ingest::types::{AcceptedAsset, AssetKind, RawAssetRef, SourceAdapter, SourceYield};
use crate::storage::{generated_name, DynStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlBudget {
    pub limit: usize,
    pub max_attempts: usize,
}

impl CrawlBudget {
    pub const MIN_IMAGE_ATTEMPTS: usize = 60;
    /// Consecutive failed pagination steps after which the session is given up.
    pub const MAX_STEP_FAILURES: usize = 3;

    /// Image hunts get `max(60, limit * 5)` pagination steps.
    pub fn for_images(limit: usize) -> Self {
        Self {
            limit,
            max_attempts: Self::MIN_IMAGE_ATTEMPTS.max(limit.saturating_mul(5)),
        }
    }
}

/// Waits between pagination steps: fixed on the first, random afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub first_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            first_ms: 5_000,
            min_ms: 2_000,
            max_ms: 5_000,
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            first_ms: 0,
            min_ms: 0,
            max_ms: 0,
        }
    }

    pub fn delay_for(&self, step: usize) -> Duration {
        let ms = if step == 0 {
            self.first_ms
        } else if self.max_ms > self.min_ms {
            rand::rng().random_range(self.min_ms..=self.max_ms)
        } else {
            self.min_ms
        };
        Duration::from_millis(ms)
    }

    pub async fn wait(&self, step: usize) {
        let d = self.delay_for(step);
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}

/// Dedup sets private to one crawl.
#[derive(Debug, Default)]
pub struct CrawlState {
    seen_raw: HashSet<String>,
    seen_canonical: HashSet<String>,
    seen_digests: HashSet<[u8; 32]>,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True on first sight; records the URL either way.
    pub fn first_sight(&mut self, raw: &str) -> bool {
        self.seen_raw.insert(raw.to_string())
    }

    pub fn seen_raw(&self) -> &HashSet<String> {
        &self.seen_raw
    }

    pub fn seen_canonical(&self) -> &HashSet<String> {
        &self.seen_canonical
    }

    fn first_payload(&mut self, payload: &[u8]) -> bool {
        let digest: [u8; 32] = Sha256::digest(payload).into();
        self.seen_digests.insert(digest)
    }
}

#[derive(Debug)]
pub enum AssetOutcome {
    AlreadySeen,
    NonContent,
    FetchFailed,
    DuplicateContent,
    Irrelevant,
    ClassifierFailed(String),
    StoreFailed(String),
    Accepted(AcceptedAsset),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    LimitReached,
    AttemptsExhausted,
    SessionFailed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlCounts {
    pub already_seen: usize,
    pub non_content: usize,
    pub fetch_failed: usize,
    pub duplicate_content: usize,
    pub rejected: usize,
    pub errors: usize,
    pub step_failures: usize,
}

#[derive(Debug)]
pub struct CrawlReport {
    pub accepted: Vec<AcceptedAsset>,
    pub attempts: usize,
    pub counts: CrawlCounts,
    pub stop: StopReason,
}

/// Per-asset filter: non-content check, ladder fetch, content dedup,
/// relevance gate, storage. Every failure ends that asset only.
pub struct AssetFilterChain {
    source: String,
    rules: LadderRules,
    gate: RelevanceGate,
    fetcher: DynFetcher,
    classifier: DynClassifier,
    storage: DynStorage,
}

impl AssetFilterChain {
    pub fn new(
        source: impl Into<String>,
        fetcher: DynFetcher,
        classifier: DynClassifier,
        storage: DynStorage,
    ) -> Self {
        Self {
            source: source.into(),
            rules: LadderRules::default(),
            gate: RelevanceGate::static_image(),
            fetcher,
            classifier,
            storage,
        }
    }

    pub fn with_rules(mut self, rules: LadderRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_gate(mut self, gate: RelevanceGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub async fn process(
        &self,
        state: &mut CrawlState,
        raw: &RawAssetRef,
        query: &str,
    ) -> AssetOutcome {
        if !state.first_sight(&raw.source_url) {
            return AssetOutcome::AlreadySeen;
        }
        counter!("crawl_raw_seen_total").increment(1);

        if self.rules.is_non_content(&raw.source_url) {
            counter!("crawl_non_content_total").increment(1);
            return AssetOutcome::NonContent;
        }

        let candidates = self.rules.candidates(&raw.source_url);
        let mut fetched: Option<(String, Vec<u8>)> = None;
        for url in candidates.iter() {
            if state.seen_canonical.contains(url) {
                continue;
            }
            match self.fetcher.fetch(url).await {
                Ok(bytes) => {
                    state.seen_canonical.insert(url.to_string());
                    fetched = Some((url.to_string(), bytes));
                    break;
                }
                Err(e) => debug!(target: "crawl", url, error = %e, "ladder candidate failed"),
            }
        }
        let Some((canonical_url, payload)) = fetched else {
            counter!("crawl_fetch_failed_total").increment(1);
            return AssetOutcome::FetchFailed;
        };

        if !state.first_payload(&payload) {
            return AssetOutcome::DuplicateContent;
        }

        match self.gate.evaluate(self.classifier.as_ref(), &payload).await {
            Ok(true) => {}
            Ok(false) => {
                counter!("crawl_rejected_total").increment(1);
                return AssetOutcome::Irrelevant;
            }
            Err(e) => {
                warn!(target: "crawl", url = %canonical_url, error = %e, "classifier failed");
                return AssetOutcome::ClassifierFailed(e.to_string());
            }
        }

        let name = generated_name(&self.source, "jpg");
        let stored_url = match self.storage.store(&payload, &name).await {
            Ok(u) => u,
            Err(e) => {
                warn!(target: "crawl", url = %canonical_url, error = %e, "store failed");
                return AssetOutcome::StoreFailed(e.to_string());
            }
        };

        counter!("crawl_accepted_total").increment(1);
        AssetOutcome::Accepted(AcceptedAsset {
            kind: AssetKind::Image,
            source: self.source.clone(),
            canonical_url,
            stored_url,
            query: query.to_string(),
            parent_video: None,
            captured_at: chrono::Utc::now(),
            payload: Arc::new(payload),
        })
    }

    /// Drive `session` until `limit` assets are accepted or `max_attempts`
    /// steps have run. A failing step counts as an empty attempt; only
    /// `MAX_STEP_FAILURES` failures in a row end the crawl early.
    pub async fn run(
        &self,
        state: &mut CrawlState,
        session: &mut dyn ScrollSession,
        budget: CrawlBudget,
        pacing: Pacing,
        query: &str,
    ) -> CrawlReport {
        let mut accepted = Vec::new();
        let mut counts = CrawlCounts::default();
        let mut attempts = 0usize;
        let mut failures_in_row = 0usize;
        let mut stop = StopReason::AttemptsExhausted;

        'steps: while attempts < budget.max_attempts {
            if accepted.len() >= budget.limit {
                stop = StopReason::LimitReached;
                break;
            }
            pacing.wait(attempts).await;
            attempts += 1;

            let refs = match session.advance().await {
                Ok(refs) => refs,
                Err(e) => {
                    counts.step_failures += 1;
                    failures_in_row += 1;
                    warn!(target: "crawl", source = %self.source, attempt = attempts, in_row = failures_in_row, error = %e, "pagination step failed");
                    if failures_in_row >= CrawlBudget::MAX_STEP_FAILURES {
                        stop = StopReason::SessionFailed;
                        break;
                    }
                    continue;
                }
            };
            failures_in_row = 0;

            for raw in &refs {
                if accepted.len() >= budget.limit {
                    stop = StopReason::LimitReached;
                    break 'steps;
                }
                match self.process(state, raw, query).await {
                    AssetOutcome::Accepted(asset) => {
                        info!(target: "crawl", source = %self.source, url = %asset.canonical_url, "asset accepted");
                        accepted.push(asset);
                    }
                    AssetOutcome::AlreadySeen => counts.already_seen += 1,
                    AssetOutcome::NonContent => counts.non_content += 1,
                    AssetOutcome::FetchFailed => counts.fetch_failed += 1,
                    AssetOutcome::DuplicateContent => counts.duplicate_content += 1,
                    AssetOutcome::Irrelevant => counts.rejected += 1,
                    AssetOutcome::ClassifierFailed(_) | AssetOutcome::StoreFailed(_) => {
                        counts.errors += 1
                    }
                }
            }
        }
        if stop != StopReason::SessionFailed && accepted.len() >= budget.limit {
            stop = StopReason::LimitReached;
        }

        session.close().await;
        info!(
            target: "crawl",
            source = %self.source,
            accepted = accepted.len(),
            attempts,
            raw_seen = state.seen_raw.len(),
            stop = ?stop,
            "crawl finished"
        );
        CrawlReport {
            accepted,
            attempts,
            counts,
            stop,
        }
    }
}

/// Image source: one scroll crawl per configured query, sharing one `limit`
/// across all queries.
pub struct ImageCrawlAdapter {
    name: String,
    queries: Vec<String>,
    limit: usize,
    chain: AssetFilterChain,
    primary: DynLauncher,
    fallback: Option<DynLauncher>,
    pacing: Pacing,
}

impl ImageCrawlAdapter {
    pub fn new(
        chain: AssetFilterChain,
        queries: Vec<String>,
        limit: usize,
        primary: DynLauncher,
        fallback: Option<DynLauncher>,
    ) -> Self {
        Self {
            name: chain.source().to_string(),
            queries,
            limit,
            chain,
            primary,
            fallback,
            pacing: Pacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }
}

#[async_trait]
impl SourceAdapter for ImageCrawlAdapter {
    async fn collect(&self) -> Result<SourceYield> {
        let mut out = SourceYield::default();
        let mut state = CrawlState::new();

        for query in &self.queries {
            let remaining = self.limit.saturating_sub(out.visual.len());
            if remaining == 0 {
                break;
            }
            let outcome = open_session(
                self.primary.as_ref(),
                self.fallback.as_deref(),
                query,
            )
            .await;
            if let SessionOutcome::Unavailable { .. } = outcome {
                let err = outcome
                    .into_session()
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                if out.visual.is_empty() {
                    return Err(anyhow!("{}: {}", self.name, err));
                }
                warn!(target: "crawl", source = %self.name, query, error = %err, "session unavailable, keeping partial yield");
                break;
            }
            let mut session = match outcome.into_session() {
                Ok(s) => s,
                Err(e) => return Err(anyhow!("{}: {}", self.name, e)),
            };
            let report = self
                .chain
                .run(
                    &mut state,
                    session.as_mut(),
                    CrawlBudget::for_images(remaining),
                    self.pacing,
                    query,
                )
                .await;
            out.visual.extend(report.accepted);
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
