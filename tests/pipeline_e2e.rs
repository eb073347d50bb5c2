// tests/pipeline_e2e.rs
//
// Whole runs over scripted sources: fusion across modalities, ranking,
// market gating, source failures and the JSON handoff.

mod common;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use common::{line, FixedPalette, FixedSentiment, ScriptedClassifier, ScriptedOracle};
use fabric_trend_radar::analyze::{ColorSwatch, Sentiment, FABRIC};
use fabric_trend_radar::evidence::{Analyzers, Vocabulary};
use fabric_trend_radar::handoff::{HandoffSink, JsonFileSink, MemorySink};
use fabric_trend_radar::ingest::types::{
    AcceptedAsset, AssetKind, DynSource, SourceAdapter, SourceYield, TextAsset,
};
use fabric_trend_radar::market::{MarketGate, MarketSettings, TrendStatus};
use fabric_trend_radar::pipeline::TrendPipeline;

fn image(source: &str, payload: &str) -> AcceptedAsset {
    AcceptedAsset {
        kind: AssetKind::Image,
        source: source.into(),
        canonical_url: format!("https://cdn.example/{payload}.jpg"),
        stored_url: format!("mem://{payload}.jpg"),
        query: "fashion".into(),
        parent_video: None,
        captured_at: Utc::now(),
        payload: Arc::new(payload.as_bytes().to_vec()),
    }
}

fn article(source: &str, text: &str) -> TextAsset {
    TextAsset {
        source: source.into(),
        url: Some("https://mag.example/a".into()),
        stored_url: None,
        text: text.into(),
        captured_at: Utc::now(),
    }
}

struct StaticSource {
    name: String,
    yielded: Option<SourceYield>,
}

impl StaticSource {
    fn ok(name: &str, visual: Vec<AcceptedAsset>, text: Vec<TextAsset>) -> DynSource {
        Arc::new(Self {
            name: name.into(),
            yielded: Some(SourceYield { visual, text }),
        })
    }

    fn failing(name: &str) -> DynSource {
        Arc::new(Self {
            name: name.into(),
            yielded: None,
        })
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    async fn collect(&self) -> Result<SourceYield> {
        self.yielded
            .clone()
            .ok_or_else(|| anyhow!("no session strategy available"))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

const SHERPA_TEXT: &str = "TITLE: Cozy season\n\nBODY:\nSherpa jackets are everywhere.";

fn classifier() -> ScriptedClassifier {
    ScriptedClassifier::new()
        .fabric_image("s1", "Sherpa", 0.95)
        .fabric_image("s2", "Sherpa", 0.80)
        .fabric_image("s3", "Sherpa", 0.71)
        .fabric_image("d1", "Denim", 0.90)
        .fabric_image("low", "Velvet", 0.50)
        .answer(SHERPA_TEXT, FABRIC, "Sherpa", 0.82)
}

fn analyzers(sentiment: Sentiment) -> Analyzers {
    Analyzers {
        classifier: Arc::new(classifier()),
        sentiment: Arc::new(FixedSentiment(sentiment)),
        palette: Arc::new(FixedPalette(vec![
            ColorSwatch::from_rgb((240, 234, 214), 0.6),
            ColorSwatch::from_rgb((240, 234, 214), 0.3),
        ])),
    }
}

fn market(oracle: ScriptedOracle) -> MarketGate {
    MarketGate::new(
        Arc::new(oracle),
        MarketSettings {
            query_delay_ms: 0,
            ..MarketSettings::default()
        },
    )
}

fn sources() -> Vec<DynSource> {
    vec![
        StaticSource::ok(
            "pinterest",
            vec![image("pinterest", "s1"), image("pinterest", "d1"), image("pinterest", "low")],
            vec![],
        ),
        StaticSource::failing("instagram"),
        StaticSource::ok("shorts", vec![image("shorts", "s2"), image("shorts", "s3")], vec![]),
        StaticSource::ok("fashion_rss", vec![], vec![article("fashion_rss", SHERPA_TEXT)]),
    ]
}

#[tokio::test]
async fn sherpa_wins_across_modalities_and_rises() {
    let oracle = ScriptedOracle::new()
        .series("Tela Sherpa", &line(0.6, 12))
        .series("Tela Denim", &line(0.0, 12));
    let sink = Arc::new(MemorySink::new());
    let pipeline = TrendPipeline::new(
        sources(),
        analyzers(Sentiment::Positive),
        Vocabulary::default(),
        market(oracle),
    )
    .with_handoff(sink.clone());

    let report = pipeline.run().await;

    let names: Vec<&str> = report.candidates.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Sherpa", "Denim"]);

    let sherpa = &report.candidates[0];
    assert_eq!(sherpa.rank, 1);
    assert_eq!(sherpa.vote_count, 5);
    assert!((sherpa.mean_confidence - 0.82).abs() < 0.005);
    assert_eq!(sherpa.market_status, Some(TrendStatus::Rising));
    assert_eq!(sherpa.market_slope, Some(0.6));
    assert_eq!(sherpa.evidence.source_text_notes, vec!["Text (POSITIVE)"]);
    assert_eq!(sherpa.evidence.source_image_urls.len(), 3);
    assert_eq!(sherpa.evidence.colors.len(), 1);

    assert_eq!(report.candidates[1].market_status, Some(TrendStatus::Stable));
    assert!(report.declined.is_empty());

    assert_eq!(report.sources.len(), 4);
    assert_eq!(report.source_errors(), 1);
    let failed = &report.sources[1];
    assert_eq!(failed.name, "instagram");
    assert!(failed.error.as_deref().unwrap().contains("no session strategy"));
    assert_eq!(report.sources[0].visual_accepted, 3);
    assert_eq!(report.sources[0].counted, 2);
    assert_eq!(report.sources[3].texts_accepted, 1);

    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].run_id, report.run_id);
}

#[tokio::test]
async fn negative_press_adds_no_votes_and_declining_is_dropped() {
    let oracle = ScriptedOracle::new()
        .series("Tela Sherpa", &line(-1.0, 12))
        .series("Tela Denim", &line(0.3, 12));
    let pipeline = TrendPipeline::new(
        sources(),
        analyzers(Sentiment::Negative),
        Vocabulary::default(),
        market(oracle),
    );

    let report = pipeline.run().await;
    assert_eq!(report.declined, vec!["Sherpa"]);
    assert_eq!(report.candidates.len(), 1);
    assert_eq!(report.candidates[0].name, "Denim");
    // Rank stays the pre-gate rank.
    assert_eq!(report.candidates[0].rank, 2);
    assert_eq!(report.candidates[0].market_status, Some(TrendStatus::RisingWeak));
}

#[tokio::test]
async fn oracle_outage_keeps_candidates_as_error() {
    let pipeline = TrendPipeline::new(
        sources(),
        analyzers(Sentiment::Neutral),
        Vocabulary::default(),
        market(ScriptedOracle::new()),
    );
    let report = pipeline.run().await;
    assert_eq!(report.candidates.len(), 2);
    assert!(report
        .candidates
        .iter()
        .all(|c| c.market_status == Some(TrendStatus::Error)));
    assert_eq!(report.candidates[0].vote_count, 4);
}

#[tokio::test]
async fn nothing_collected_yields_empty_report() {
    let pipeline = TrendPipeline::new(
        vec![StaticSource::failing("a"), StaticSource::failing("b")],
        analyzers(Sentiment::Positive),
        Vocabulary::default(),
        market(ScriptedOracle::new()),
    );
    let report = pipeline.run().await;
    assert!(report.candidates.is_empty());
    assert!(report.declined.is_empty());
    assert_eq!(report.source_errors(), 2);
    assert!(report.finished_at >= report.started_at);
}

#[tokio::test]
async fn report_lands_in_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("last_run.json");
    let sink = Arc::new(JsonFileSink::new(&path));
    let pipeline = TrendPipeline::new(
        sources(),
        analyzers(Sentiment::Positive),
        Vocabulary::default(),
        market(ScriptedOracle::new().series("Tela Sherpa", &line(0.6, 12))),
    )
    .with_handoff(sink.clone());

    let report = pipeline.run().await;
    let json = sink.read_latest().await.unwrap().unwrap();
    assert_eq!(json["run_id"], serde_json::json!(report.run_id));
    assert_eq!(json["candidates"][0]["name"], "Sherpa");
    assert_eq!(json["candidates"][0]["market_status"], "RISING");
    assert_eq!(json["candidates"][1]["market_status"], "ERROR");
    assert_eq!(sink.name(), "json_file");
}
