// src/ingest/text.rs
//! Text sources: fetch documents, normalize, drop near-duplicates, persist.
//!
//! Near-duplicate check: normalized Levenshtein similarity in [0.0, 1.0]
//! against every text kept so far in this run; `>= 0.90` is a duplicate.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ingest::normalize_text;
use crate::ingest::types::{SourceAdapter, SourceYield, TextAsset};
use crate::storage::{generated_name, DynStorage};

/// One document as read from a text source, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDoc {
    pub url: Option<String>,
    pub title: String,
    pub body: String,
}

impl TextDoc {
    /// Layout used both for analysis and for the stored `.txt` file.
    pub fn render(&self) -> String {
        format!("TITLE: {}\n\nBODY:\n{}", self.title.trim(), self.body.trim())
    }
}

#[async_trait]
pub trait TextSource: Send + Sync {
    /// Up to `limit` documents. Per-document failures are skipped inside.
    async fn read(&self, limit: usize) -> Result<Vec<TextDoc>>;
    fn name(&self) -> &str;
}

pub type DynTextSource = Arc<dyn TextSource>;

#[derive(Debug, Clone)]
pub struct TextDedup {
    similarity_threshold: f64,
    kept: Vec<String>,
}

impl Default for TextDedup {
    fn default() -> Self {
        Self::new(0.90)
    }
}

impl TextDedup {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold: similarity_threshold.clamp(0.0, 1.0),
            kept: Vec::new(),
        }
    }

    /// True if `text` is a near-duplicate of a kept text; otherwise keeps it.
    pub fn should_block(&mut self, text: &str) -> bool {
        let norm = text.to_lowercase();
        if self
            .kept
            .iter()
            .any(|k| strsim::normalized_levenshtein(&norm, k) >= self.similarity_threshold)
        {
            return true;
        }
        self.kept.push(norm);
        false
    }
}

pub struct TextSourceAdapter {
    source: DynTextSource,
    storage: Option<DynStorage>,
    limit: usize,
}

impl TextSourceAdapter {
    pub fn new(source: DynTextSource, limit: usize) -> Self {
        Self {
            source,
            storage: None,
            limit,
        }
    }

    pub fn with_storage(mut self, storage: DynStorage) -> Self {
        self.storage = Some(storage);
        self
    }
}

#[async_trait]
impl SourceAdapter for TextSourceAdapter {
    async fn collect(&self) -> Result<SourceYield> {
        let docs = self.source.read(self.limit).await?;
        let mut dedup = TextDedup::default();
        let mut out = SourceYield::default();

        for doc in docs {
            if doc.title.trim().is_empty() && doc.body.trim().is_empty() {
                continue;
            }
            let text = normalize_text(&doc.render());
            if text.is_empty() {
                continue;
            }
            if dedup.should_block(&text) {
                debug!(target: "crawl", source = self.source.name(), url = ?doc.url, "near-duplicate text skipped");
                continue;
            }

            // Persisting is best-effort; the text still counts as evidence.
            let mut stored_url = None;
            if let Some(storage) = &self.storage {
                let name = generated_name(self.source.name(), "txt");
                match storage.store(doc.render().as_bytes(), &name).await {
                    Ok(u) => stored_url = Some(u),
                    Err(e) => warn!(target: "crawl", source = self.source.name(), error = %e, "text store failed"),
                }
            }

            out.text.push(TextAsset {
                source: self.source.name().to_string(),
                url: doc.url,
                stored_url,
                text,
                captured_at: chrono::Utc::now(),
            });
        }

        info!(target: "crawl", source = self.source.name(), texts = out.text.len(), "text source read");
        Ok(out)
    }

    fn name(&self) -> &str {
        self.source.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn near_duplicates_are_blocked() {
        let mut d = TextDedup::default();
        assert!(!d.should_block("Sherpa jackets are back this winter season"));
        assert!(d.should_block("Sherpa jackets are back this winter season!"));
        assert!(!d.should_block("Velvet dominates evening wear"));
    }

    struct Fixed(Vec<TextDoc>);

    #[async_trait]
    impl TextSource for Fixed {
        async fn read(&self, limit: usize) -> Result<Vec<TextDoc>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
        fn name(&self) -> &str {
            "web_article"
        }
    }

    fn doc(title: &str, body: &str) -> TextDoc {
        TextDoc {
            url: Some(format!("https://mag.example/{}", title.len())),
            title: title.into(),
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn adapter_normalizes_dedups_and_stores() {
        let storage = Arc::new(MemoryStorage::new());
        let src = Fixed(vec![
            doc("Sherpa", "Sherpa&nbsp;is everywhere   this season."),
            doc("Sherpa", "Sherpa is everywhere this season"),
            doc("", ""),
            doc("Satin", "<p>Satin slip dresses return</p>"),
        ]);
        let adapter = TextSourceAdapter::new(Arc::new(src), 10).with_storage(storage.clone());
        let y = adapter.collect().await.unwrap();
        assert_eq!(y.text.len(), 2);
        assert!(y.text[0].text.contains("Sherpa is everywhere this season"));
        assert!(y.text[1].text.contains("Satin slip dresses return"));
        assert!(y.text.iter().all(|t| t.stored_url.is_some()));
        assert_eq!(storage.len(), 2);
    }
}
