// src/ingest/providers/article.rs
//! Reads a fixed list of article URLs and pulls title + paragraph text.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::ingest::fetch::HttpFetcher;
use crate::ingest::text::{TextDoc, TextSource};

static RE_DROP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|nav|footer|header)\b[^>]*>.*?</(script|style|noscript|nav|footer|header)>")
        .expect("valid drop regex")
});
static RE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));
static RE_H1: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("valid h1 regex"));
static RE_P: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").expect("valid p regex"));
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid tag regex"));

fn strip_tags(s: &str) -> String {
    let text = RE_TAG.replace_all(s, " ");
    html_escape::decode_html_entities(text.trim()).trim().to_string()
}

/// Title (first `<h1>`, else `<title>`) and body (non-empty `<p>` blocks,
/// one per line).
pub fn extract_article(html: &str) -> (String, String) {
    let cleaned = RE_DROP.replace_all(html, "");
    let title = RE_H1
        .captures(&cleaned)
        .or_else(|| RE_TITLE.captures(&cleaned))
        .map(|c| strip_tags(&c[1]))
        .unwrap_or_default();
    let body = RE_P
        .captures_iter(&cleaned)
        .map(|c| strip_tags(&c[1]))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (title, body)
}

pub struct ArticleReader {
    name: String,
    urls: Vec<String>,
    fetcher: HttpFetcher,
}

impl ArticleReader {
    pub fn new(name: impl Into<String>, urls: Vec<String>, fetcher: HttpFetcher) -> Self {
        Self {
            name: name.into(),
            urls,
            fetcher,
        }
    }
}

#[async_trait]
impl TextSource for ArticleReader {
    async fn read(&self, limit: usize) -> Result<Vec<TextDoc>> {
        let mut out = Vec::new();
        for url in self.urls.iter().take(limit) {
            let html = match self.fetcher.fetch_text(url).await {
                Ok(h) => h,
                Err(e) => {
                    warn!(target: "crawl", source = %self.name, url = %url, error = %e, "article fetch failed");
                    continue;
                }
            };
            let (title, body) = extract_article(&html);
            if body.is_empty() {
                warn!(target: "crawl", source = %self.name, url = %url, "article has no body text");
                continue;
            }
            out.push(TextDoc {
                url: Some(url.clone()),
                title,
                body,
            });
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
