//! history.rs: bounded in-memory log of finished runs for the status API.

use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::pipeline::RunReport;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub finished_unix: i64,
    pub elapsed_ms: i64,
    pub candidates: Vec<String>,
    pub declined: usize,
    pub source_errors: usize,
}

impl RunSummary {
    fn of(report: &RunReport) -> Self {
        Self {
            run_id: report.run_id.clone(),
            finished_unix: report.finished_at.timestamp(),
            elapsed_ms: (report.finished_at - report.started_at).num_milliseconds(),
            candidates: report.candidates.iter().map(|c| c.name.clone()).collect(),
            declined: report.declined.len(),
            source_errors: report.source_errors(),
        }
    }
}

#[derive(Debug)]
pub struct RunHistory {
    inner: Mutex<Inner>,
    cap: usize,
}

#[derive(Debug, Default)]
struct Inner {
    summaries: Vec<RunSummary>,
    latest: Option<Arc<RunReport>>,
}

impl RunHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 1_000);
        Self {
            inner: Mutex::new(Inner {
                summaries: Vec::with_capacity(cap),
                latest: None,
            }),
            cap,
        }
    }

    pub fn push(&self, report: RunReport) {
        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.summaries.push(RunSummary::of(&report));
        if g.summaries.len() > self.cap {
            let excess = g.summaries.len() - self.cap;
            g.summaries.drain(0..excess);
        }
        g.latest = Some(Arc::new(report));
    }

    pub fn latest(&self) -> Option<Arc<RunReport>> {
        let g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.latest.clone()
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<RunSummary> {
        let g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let start = g.summaries.len().saturating_sub(n);
        g.summaries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        let g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
