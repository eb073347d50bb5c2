// src/config/pipeline.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::evidence::Vocabulary;
use crate::ingest::ladder::LadderRules;
use crate::market::MarketSettings;

const ENV_PATH: &str = "PIPELINE_CONFIG_PATH";

pub const BROWSERLESS_TOKEN_ENV: &str = "BROWSERLESS_TOKEN";
pub const INFERENCE_API_KEY_ENV: &str = "INFERENCE_API_KEY";
pub const ORACLE_API_KEY_ENV: &str = "TREND_ORACLE_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSourceConfig {
    pub name: String,
    pub queries: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Search page URL with `{query}` and `{page}` placeholders.
    pub search_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSourceConfig {
    pub name: String,
    pub tags: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Sampling period; 1500 for short-form, 2000 for generic video.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default = "default_query_suffix")]
    pub query_suffix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TextSourceConfig {
    Article {
        name: String,
        urls: Vec<String>,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    Rss {
        name: String,
        url: String,
        #[serde(default = "default_limit")]
        limit: usize,
        #[serde(default)]
        max_age_days: Option<u32>,
    },
}

impl TextSourceConfig {
    pub fn name(&self) -> &str {
        match self {
            TextSourceConfig::Article { name, .. } | TextSourceConfig::Rss { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub first_delay_ms: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub fetch_timeout_secs: u64,
    pub ladder: LadderRules,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            first_delay_ms: 5_000,
            min_delay_ms: 2_000,
            max_delay_ms: 5_000,
            fetch_timeout_secs: 10,
            ladder: LadderRules::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub ytdlp_bin: String,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub download_timeout_secs: u64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            ytdlp_bin: "yt-dlp".into(),
            ffmpeg_bin: "ffmpeg".into(),
            ffprobe_bin: "ffprobe".into(),
            download_timeout_secs: 180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub base_url: String,
    /// "ENV" reads `INFERENCE_API_KEY`.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// "model" or "lexicon".
    pub sentiment: String,
    /// "model" or "kmeans".
    pub palette: String,
    pub palette_colors: usize,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8500".into(),
            api_key: None,
            timeout_secs: 60,
            sentiment: "model".into(),
            palette: "model".into(),
            palette_colors: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub base_url: String,
    /// "ENV" reads `TREND_ORACLE_API_KEY`.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8600".into(),
            api_key: None,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Managed rendering service; when unset only local Chromium is tried.
    pub browserless_url: Option<String>,
    /// "ENV" reads `BROWSERLESS_TOKEN`.
    pub browserless_token: Option<String>,
    /// Falls back to `$CHROME_BIN`, then `chromium`.
    pub chrome_bin: Option<String>,
    pub render_timeout_secs: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            browserless_url: None,
            browserless_token: None,
            chrome_bin: None,
            render_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub base_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_dir: "resources/trend_data".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffSettings {
    pub path: String,
    pub history_cap: usize,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            path: "state/last_run.json".into(),
            history_cap: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub vocabulary: Vocabulary,
    pub image_sources: Vec<ImageSourceConfig>,
    pub video_sources: Vec<VideoSourceConfig>,
    pub text_sources: Vec<TextSourceConfig>,
    pub crawl: CrawlSettings,
    pub frames: FrameSettings,
    pub market: MarketSettings,
    pub inference: InferenceSettings,
    pub oracle: OracleSettings,
    pub browser: BrowserSettings,
    pub storage: StorageSettings,
    pub handoff: HandoffSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vocabulary: Vocabulary::default(),
            image_sources: vec![ImageSourceConfig {
                name: "pinterest".into(),
                queries: vec!["Fashion Trends 2026".into()],
                limit: 5,
                search_url: "https://www.pinterest.com/search/pins/?q={query}&page={page}".into(),
            }],
            video_sources: vec![VideoSourceConfig {
                name: "shorts".into(),
                tags: vec!["FashionTrends2026".into()],
                limit: 5,
                period_ms: default_period_ms(),
                query_suffix: default_query_suffix(),
            }],
            text_sources: Vec::new(),
            crawl: CrawlSettings::default(),
            frames: FrameSettings::default(),
            market: MarketSettings::default(),
            inference: InferenceSettings::default(),
            oracle: OracleSettings::default(),
            browser: BrowserSettings::default(),
            storage: StorageSettings::default(),
            handoff: HandoffSettings::default(),
        }
    }
}

fn default_limit() -> usize {
    5
}
fn default_period_ms() -> u64 {
    1_500
}
fn default_query_suffix() -> String {
    "#shorts".into()
}

/// `"ENV"` (any case) means: read `env_name`. Missing env var is an error.
pub fn resolve_secret(value: &Option<String>, env_name: &str) -> Result<Option<String>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("env") => std::env::var(env_name)
            .map(Some)
            .map_err(|_| anyhow!("Missing {env_name} env var")),
        Some(v) => Ok(Some(v.to_string())),
    }
}

impl PipelineConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = Self::parse(&content, &ext)
            .with_context(|| format!("parsing pipeline config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// 1) $PIPELINE_CONFIG_PATH (must exist)
    /// 2) config/pipeline.toml
    /// 3) config/pipeline.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        for candidate in ["config/pipeline.toml", "config/pipeline.json"] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Ok(Self::default())
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        if hint_ext == "json" {
            return Ok(serde_json::from_str(s)?);
        }
        match toml::from_str::<Self>(s) {
            Ok(cfg) => Ok(cfg),
            Err(toml_err) => serde_json::from_str(s)
                .map_err(|_| anyhow!("unsupported pipeline config format: {toml_err}")),
        }
    }

    fn sanitized(mut self) -> Self {
        let c = &mut self.crawl;
        if c.min_delay_ms > c.max_delay_ms {
            std::mem::swap(&mut c.min_delay_ms, &mut c.max_delay_ms);
        }
        if c.fetch_timeout_secs == 0 {
            c.fetch_timeout_secs = CrawlSettings::default().fetch_timeout_secs;
        }
        for s in &mut self.image_sources {
            s.limit = s.limit.max(1);
        }
        for s in &mut self.video_sources {
            s.limit = s.limit.max(1);
            if s.period_ms == 0 {
                s.period_ms = default_period_ms();
            }
        }
        if self.market.window_months == 0 {
            self.market.window_months = MarketSettings::default().window_months;
        }
        if self.market.region.trim().is_empty() {
            self.market.region = MarketSettings::default().region;
        }
        self.inference.palette_colors = self.inference.palette_colors.max(1);
        self.handoff.history_cap = self.handoff.history_cap.max(1);
        self
    }
}
