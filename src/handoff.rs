// src/handoff.rs
//! Downstream boundary: the gated ranking leaves the pipeline here. Copy and
//! image synthesis consume the written report.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;

use crate::pipeline::RunReport;

#[async_trait]
pub trait HandoffSink: Send + Sync {
    async fn deliver(&self, report: &RunReport) -> Result<()>;
    fn name(&self) -> &'static str;
}

pub type DynHandoff = Arc<dyn HandoffSink>;

/// Writes the report as pretty JSON. The file is replaced atomically so a
/// reader never sees a half-written report.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last delivered report as raw JSON, if any.
    pub async fn read_latest(&self) -> Result<Option<serde_json::Value>> {
        match fs::read_to_string(&self.path).await {
            Ok(s) => {
                let report = serde_json::from_str(&s)
                    .with_context(|| format!("parsing {}", self.path.display()))?;
                Ok(Some(report))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }
}

#[async_trait]
impl HandoffSink for JsonFileSink {
    async fn deliver(&self, report: &RunReport) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(report).context("serializing run report")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json_file"
    }
}

/// Keeps delivered reports in memory.
#[derive(Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<RunReport>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<RunReport> {
        self.delivered
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HandoffSink for MemorySink {
    async fn deliver(&self, report: &RunReport) -> Result<()> {
        self.delivered
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink poisoned"))?
            .push(report.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
