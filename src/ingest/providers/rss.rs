// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::ingest::fetch::HttpFetcher;
use crate::ingest::text::{TextDoc, TextSource};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

pub fn parse_rfc2822_to_unix(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
}

/// Fashion RSS feed as a text source. Items older than `max_age_days` (when
/// set and the item is dated) are skipped.
pub struct RssTextSource {
    name: String,
    mode: Mode,
    max_age_days: Option<u32>,
}

enum Mode {
    Fixture(String),
    Http { url: String, fetcher: HttpFetcher },
}

impl RssTextSource {
    pub fn from_url(name: impl Into<String>, url: impl Into<String>, fetcher: HttpFetcher) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                fetcher,
            },
            max_age_days: None,
        }
    }

    pub fn from_fixture_str(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
            max_age_days: None,
        }
    }

    pub fn with_max_age_days(mut self, days: Option<u32>) -> Self {
        self.max_age_days = days;
        self
    }

    fn parse_items(&self, s: &str, now: i64, limit: usize) -> Result<Vec<TextDoc>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let cutoff = self
            .max_age_days
            .map(|d| now - i64::from(d) * 86_400);

        let mut out = Vec::new();
        for it in rss.channel.item {
            if out.len() >= limit {
                break;
            }
            let published = it.pub_date.as_deref().and_then(parse_rfc2822_to_unix);
            if let (Some(cutoff), Some(ts)) = (cutoff, published) {
                if ts < cutoff {
                    continue;
                }
            }
            let title = it.title.unwrap_or_default();
            let body = it.description.unwrap_or_default();
            if title.trim().is_empty() && body.trim().is_empty() {
                continue;
            }
            out.push(TextDoc {
                url: it.link,
                title,
                body,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("rss_parse_ms").record(ms);
        Ok(out)
    }
}

#[async_trait]
impl TextSource for RssTextSource {
    async fn read(&self, limit: usize) -> Result<Vec<TextDoc>> {
        let now = chrono::Utc::now().timestamp();
        match &self.mode {
            Mode::Fixture(s) => self.parse_items(s, now, limit),
            Mode::Http { url, fetcher } => {
                let body = fetcher
                    .fetch_text(url)
                    .await
                    .with_context(|| format!("{} http get", self.name))?;
                self.parse_items(&body, now, limit)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
