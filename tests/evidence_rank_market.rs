// tests/evidence_rank_market.rs
//
// Evidence fusion, ranking order and the market gate, driven directly.

mod common;

use std::sync::Arc;

use common::{cls, line, ScriptedOracle};
use fabric_trend_radar::analyze::{
    CategoryRequest, ClassificationMap, ColorSwatch, Sentiment, TextAttributes, FABRIC, FINISH,
    TEXTURE,
};
use fabric_trend_radar::evidence::{EvidenceAggregator, TextOutcome, VisualOutcome, Vocabulary};
use fabric_trend_radar::market::{MarketGate, MarketSettings, TrendStatus};
use fabric_trend_radar::ranking::{RankedCandidate, TrendRanker};

fn visual(fabric: &str, score: f32) -> ClassificationMap {
    let mut m = ClassificationMap::new();
    m.insert(FABRIC.into(), cls(fabric, score));
    m
}

fn text_attrs(fabric: &str, score: f32) -> TextAttributes {
    let vocab = Vocabulary::default();
    let mut m = ClassificationMap::new();
    m.insert(FABRIC.into(), cls(fabric, score));
    TextAttributes::from_results(&vocab.attribute_request(), m)
}

#[test]
fn votes_only_grow_and_negative_text_adds_nothing() {
    let mut agg = EvidenceAggregator::new(Vocabulary::default());
    let steps: Vec<Box<dyn Fn(&mut EvidenceAggregator)>> = vec![
        Box::new(|a: &mut EvidenceAggregator| {
            a.add_visual(&visual("Velvet", 0.9), "u1", &[]);
        }),
        Box::new(|a: &mut EvidenceAggregator| {
            a.add_text(&text_attrs("Velvet", 0.8), Sentiment::Negative);
        }),
        Box::new(|a: &mut EvidenceAggregator| {
            a.add_visual(&visual("Velvet", 0.5), "u2", &[]);
        }),
        Box::new(|a: &mut EvidenceAggregator| {
            a.add_text(&text_attrs("Velvet", 0.8), Sentiment::Neutral);
        }),
        Box::new(|a: &mut EvidenceAggregator| {
            a.add_text(&text_attrs("Velvet", 0.8), Sentiment::Positive);
        }),
    ];
    let mut last = 0;
    for step in steps {
        step(&mut agg);
        let now = agg.get("Velvet").map(|e| e.vote_count).unwrap_or(0);
        assert!(now >= last, "votes went from {last} to {now}");
        last = now;
    }
    assert_eq!(last, 1 + 1 + 2);
    let ev = agg.get("Velvet").unwrap();
    assert_eq!(ev.confidence_scores, vec![0.9]);
    assert_eq!(ev.source_text_notes, vec!["Text (NEUTRAL)", "Text (POSITIVE)"]);
}

#[test]
fn thresholds_and_vocabulary_gate_votes() {
    let mut agg = EvidenceAggregator::new(Vocabulary::default());
    assert!(matches!(
        agg.add_visual(&visual("Sherpa", 0.69), "u", &[]),
        VisualOutcome::BelowThreshold { .. }
    ));
    assert!(matches!(
        agg.add_visual(&visual("Sherpa", 0.70), "u", &[]),
        VisualOutcome::Counted { .. }
    ));
    assert!(matches!(
        agg.add_visual(&visual("Tweed", 0.99), "u", &[]),
        VisualOutcome::UnknownLabel(_)
    ));
    // Text cut is strict at 0.4.
    assert_eq!(
        agg.add_text(&text_attrs("Sherpa", 0.4), Sentiment::Positive),
        TextOutcome::NoFabric
    );
    assert!(matches!(
        agg.add_text(&text_attrs("Sherpa", 0.41), Sentiment::Positive),
        TextOutcome::Counted { weight: 2, .. }
    ));
    assert_eq!(agg.get("Sherpa").unwrap().vote_count, 3);
    assert!(agg.get("Tweed").is_none());
}

#[test]
fn attributes_and_colors_are_assembled_for_handoff() {
    let mut agg = EvidenceAggregator::new(Vocabulary::default());
    let swatch = |rgb| ColorSwatch::from_rgb(rgb, 0.5);
    for (texture, finish) in [
        ("Soft", "Matte"),
        ("Soft", "Shiny"),
        ("Fluffy", "Matte"),
        ("Quilted", "Matte"),
        ("Rough", "Matte"),
    ] {
        let mut m = visual("Sherpa", 0.9);
        m.insert(TEXTURE.into(), cls(texture, 0.6));
        m.insert(FINISH.into(), cls(finish, 0.6));
        agg.add_visual(
            &m,
            "u",
            &[swatch((240, 230, 220)), swatch((240, 230, 220)), swatch((10, 20, 30))],
        );
    }

    let ranked = TrendRanker::default().rank(&agg);
    let ev = &ranked[0].evidence;
    assert_eq!(ev.texture_votes.len(), 3);
    assert_eq!(ev.texture_votes.get("Soft"), 2);
    assert_eq!(ev.finish_votes.get("Matte"), 4);
    assert_eq!(ev.colors.len(), 2);
    assert!(ev.colors.iter().all(|c| !c.pantone_code.is_empty()));
}

#[test]
fn ranking_orders_by_votes_then_first_vote() {
    let mut agg = EvidenceAggregator::new(Vocabulary::default());
    // C votes first, then B, then A; A ends with the most votes.
    agg.add_visual(&visual("Satin", 0.9), "c", &[]);
    agg.add_visual(&visual("Denim", 0.9), "b", &[]);
    for _ in 0..3 {
        agg.add_visual(&visual("Velvet", 0.9), "a", &[]);
    }
    agg.add_text(&text_attrs("Denim", 0.9), Sentiment::Neutral);
    agg.add_text(&text_attrs("Satin", 0.9), Sentiment::Neutral);
    // Denim and Satin tie at 2; Satin voted first.
    let names: Vec<String> = TrendRanker::default()
        .rank(&agg)
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Velvet", "Satin", "Denim"]);
}

#[test]
fn equal_votes_rank_in_insertion_order_not_alphabetically() {
    let mut agg = EvidenceAggregator::new(Vocabulary::default());
    // A = Velvet, B = Denim, C = Satin; Velvet is seen before Denim.
    for (fabric, n) in [("Velvet", 5), ("Denim", 5), ("Satin", 3)] {
        for _ in 0..n {
            agg.add_visual(&visual(fabric, 0.9), "u", &[]);
        }
    }
    let ranked = TrendRanker::default().rank(&agg);
    let names: Vec<&str> = ranked.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Velvet", "Denim", "Satin"]);
}

#[test]
fn fabric_request_covers_all_categories() {
    let req: CategoryRequest = Vocabulary::default().attribute_request();
    assert_eq!(req.labels(FABRIC).unwrap().len(), 11);
    assert!(req.labels(TEXTURE).is_some());
    assert!(req.labels(FINISH).is_some());
}

fn candidate(name: &str, rank: usize) -> RankedCandidate {
    RankedCandidate {
        rank,
        name: name.into(),
        vote_count: 1,
        mean_confidence: 0.9,
        evidence: Default::default(),
        market_status: None,
        market_slope: None,
        mean_interest: None,
    }
}

fn gate(oracle: Arc<ScriptedOracle>) -> MarketGate {
    MarketGate::new(
        oracle,
        MarketSettings {
            query_delay_ms: 0,
            ..MarketSettings::default()
        },
    )
}

#[tokio::test]
async fn gate_drops_declining_and_keeps_unknowns() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .series("Tela Velvet", &line(0.6, 12))
            .series("Tela Denim", &line(-0.8, 12))
            .series("Tela Satin", &line(0.3, 12))
            .no_data("Tela Lino"),
    );
    let out = gate(oracle.clone())
        .apply(vec![
            candidate("Velvet", 1),
            candidate("Denim", 2),
            candidate("Satin", 3),
            candidate("Lino", 4),
            candidate("Jersey", 5),
        ])
        .await;

    assert_eq!(out.declined, vec!["Denim"]);
    let statuses: Vec<(String, Option<TrendStatus>)> = out
        .passed
        .iter()
        .map(|c| (c.name.clone(), c.market_status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("Velvet".to_string(), Some(TrendStatus::Rising)),
            ("Satin".to_string(), Some(TrendStatus::RisingWeak)),
            ("Lino".to_string(), Some(TrendStatus::NoData)),
            ("Jersey".to_string(), Some(TrendStatus::Error)),
        ]
    );
    assert_eq!(out.passed[0].market_slope, Some(0.6));
    assert!(out.passed[3].market_slope.is_none());
    assert_eq!(oracle.queried_terms().len(), 5);
}

#[tokio::test]
async fn gate_queries_in_region_and_window() {
    let oracle = Arc::new(ScriptedOracle::new().series("Tela Sherpa", &[1.0, 1.0]));
    gate(oracle.clone()).apply(vec![candidate("Sherpa", 1)]).await;
    let q = oracle.queries.lock().unwrap()[0].clone();
    assert_eq!(q.region, "CO");
    assert_eq!(q.window_months, 12);
}

#[tokio::test]
async fn weakly_declining_candidates_pass() {
    let oracle = Arc::new(ScriptedOracle::new().series("Tela Satin", &line(-0.3, 12)));
    let out = gate(oracle).apply(vec![candidate("Satin", 1)]).await;
    assert!(out.declined.is_empty());
    assert_eq!(out.passed[0].market_status, Some(TrendStatus::DecliningWeak));
}
