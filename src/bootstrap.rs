// src/bootstrap.rs
//! Wires concrete collaborators from `PipelineConfig`.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::analyze::http::HttpInference;
use crate::analyze::{
    DynClassifier, DynPalette, DynSentiment, KMeansPalette, LexiconSentiment,
};
use crate::config::pipeline::{
    ImageSourceConfig, TextSourceConfig, VideoSourceConfig, BROWSERLESS_TOKEN_ENV,
    INFERENCE_API_KEY_ENV, ORACLE_API_KEY_ENV,
};
use crate::config::{resolve_secret, PipelineConfig};
use crate::evidence::Analyzers;
use crate::handoff::JsonFileSink;
use crate::ingest::crawl::{AssetFilterChain, ImageCrawlAdapter, Pacing};
use crate::ingest::fetch::{DynFetcher, HttpFetcher};
use crate::ingest::providers::article::ArticleReader;
use crate::ingest::providers::browser::{
    BrowserlessLauncher, BrowserlessRenderer, ChromeLauncher, ChromeRenderer,
};
use crate::ingest::providers::rss::RssTextSource;
use crate::ingest::session::DynLauncher;
use crate::ingest::text::{DynTextSource, TextSourceAdapter};
use crate::ingest::types::DynSource;
use crate::market::http::HttpTrendOracle;
use crate::market::MarketGate;
use crate::pipeline::TrendPipeline;
use crate::storage::{DynStorage, LocalStorage};
use crate::video::hunt::VideoCrawlAdapter;
use crate::video::sampler::{FrameSampler, SamplerConfig};
use crate::video::ytdlp::YtDlpVideoSource;

/// Shared pieces every source is built from.
struct Shared {
    storage: DynStorage,
    classifier: DynClassifier,
    fetcher: DynFetcher,
    http_fetcher: HttpFetcher,
    pacing: Pacing,
}

pub fn build_analyzers(cfg: &PipelineConfig) -> Result<Analyzers> {
    let inf = &cfg.inference;
    let api_key = resolve_secret(&inf.api_key, INFERENCE_API_KEY_ENV)
        .context("inference api key")?;
    let inference = Arc::new(
        HttpInference::new(inf.base_url.clone(), Duration::from_secs(inf.timeout_secs))
            .with_api_key(api_key)
            .with_palette_colors(inf.palette_colors),
    );

    let classifier: DynClassifier = inference.clone();
    let sentiment: DynSentiment = match inf.sentiment.to_ascii_lowercase().as_str() {
        "lexicon" => Arc::new(LexiconSentiment::new()),
        _ => inference.clone(),
    };
    let palette: DynPalette = match inf.palette.to_ascii_lowercase().as_str() {
        "kmeans" => Arc::new(KMeansPalette::new(inf.palette_colors)),
        _ => inference,
    };

    info!(
        target: "pipeline",
        classifier = classifier.name(),
        sentiment = sentiment.name(),
        palette = palette.name(),
        "analyzers ready"
    );
    Ok(Analyzers {
        classifier,
        sentiment,
        palette,
    })
}

/// Browserless first when configured, local Chromium otherwise (or as its
/// fallback).
fn launchers(cfg: &PipelineConfig, template: &str) -> Result<(DynLauncher, Option<DynLauncher>)> {
    let b = &cfg.browser;
    let timeout = Duration::from_secs(b.render_timeout_secs);
    let chrome: DynLauncher = Arc::new(ChromeLauncher::new(
        ChromeRenderer::new(b.chrome_bin.clone(), timeout),
        template,
    ));

    match b.browserless_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(base) => {
            let token = resolve_secret(&b.browserless_token, BROWSERLESS_TOKEN_ENV)
                .context("browserless token")?;
            let remote: DynLauncher = Arc::new(BrowserlessLauncher::new(
                BrowserlessRenderer::new(base, token.as_deref(), timeout),
                template,
            ));
            Ok((remote, Some(chrome)))
        }
        None => Ok((chrome, None)),
    }
}

fn image_source(cfg: &PipelineConfig, shared: &Shared, src: &ImageSourceConfig) -> Result<DynSource> {
    let (primary, fallback) = launchers(cfg, &src.search_url)?;
    let chain = AssetFilterChain::new(
        src.name.clone(),
        shared.fetcher.clone(),
        shared.classifier.clone(),
        shared.storage.clone(),
    )
    .with_rules(cfg.crawl.ladder.clone());
    Ok(Arc::new(
        ImageCrawlAdapter::new(chain, src.queries.clone(), src.limit, primary, fallback)
            .with_pacing(shared.pacing),
    ))
}

fn video_source(cfg: &PipelineConfig, shared: &Shared, src: &VideoSourceConfig) -> DynSource {
    let f = &cfg.frames;
    let videos = YtDlpVideoSource::new(src.name.clone())
        .with_binaries(&f.ytdlp_bin, &f.ffmpeg_bin, &f.ffprobe_bin)
        .with_query_suffix(&src.query_suffix)
        .with_timeout(Duration::from_secs(f.download_timeout_secs));
    let sampler = FrameSampler::new(
        src.name.clone(),
        SamplerConfig {
            period: Duration::from_millis(src.period_ms),
        },
        shared.classifier.clone(),
        shared.storage.clone(),
    );
    Arc::new(VideoCrawlAdapter::new(
        Arc::new(videos),
        sampler,
        src.tags.clone(),
        src.limit,
    ))
}

fn text_source(shared: &Shared, src: &TextSourceConfig) -> DynSource {
    let (reader, limit): (DynTextSource, usize) = match src {
        TextSourceConfig::Article { name, urls, limit } => (
            Arc::new(ArticleReader::new(name.clone(), urls.clone(), shared.http_fetcher.clone()))
                as DynTextSource,
            *limit,
        ),
        TextSourceConfig::Rss {
            name,
            url,
            limit,
            max_age_days,
        } => (
            Arc::new(
                RssTextSource::from_url(name.clone(), url.clone(), shared.http_fetcher.clone())
                    .with_max_age_days(*max_age_days),
            ) as DynTextSource,
            *limit,
        ),
    };
    Arc::new(TextSourceAdapter::new(reader, limit).with_storage(shared.storage.clone()))
}

/// Sources in run order: images, videos, text.
pub fn build_pipeline(cfg: &PipelineConfig) -> Result<TrendPipeline> {
    let analyzers = build_analyzers(cfg)?;
    let http_fetcher = HttpFetcher::new(Duration::from_secs(cfg.crawl.fetch_timeout_secs));
    let shared = Shared {
        storage: Arc::new(LocalStorage::new(&cfg.storage.base_dir)),
        classifier: analyzers.classifier.clone(),
        fetcher: Arc::new(http_fetcher.clone()),
        http_fetcher,
        pacing: Pacing {
            first_ms: cfg.crawl.first_delay_ms,
            min_ms: cfg.crawl.min_delay_ms,
            max_ms: cfg.crawl.max_delay_ms,
        },
    };

    let mut sources: Vec<DynSource> = Vec::new();
    for src in &cfg.image_sources {
        sources.push(image_source(cfg, &shared, src).with_context(|| format!("image source {}", src.name))?);
    }
    for src in &cfg.video_sources {
        sources.push(video_source(cfg, &shared, src));
    }
    for src in &cfg.text_sources {
        sources.push(text_source(&shared, src));
    }

    let oracle_key = resolve_secret(&cfg.oracle.api_key, ORACLE_API_KEY_ENV)
        .context("trend oracle api key")?;
    let oracle = HttpTrendOracle::new(
        &cfg.oracle.base_url,
        oracle_key,
        Duration::from_secs(cfg.oracle.timeout_secs),
    );
    let gate = MarketGate::new(Arc::new(oracle), cfg.market.clone());

    let pipeline = TrendPipeline::new(sources, analyzers, cfg.vocabulary.clone(), gate)
        .with_handoff(Arc::new(JsonFileSink::new(&cfg.handoff.path)));
    info!(target: "pipeline", sources = ?pipeline.source_names(), "pipeline built");
    Ok(pipeline)
}
