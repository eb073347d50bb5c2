// src/evidence.rs
//! Cross-modal evidence per candidate fabric.
//!
//! Visual assets vote 1 when their fabric score clears 0.70. Texts vote by
//! sentiment (POSITIVE 2, NEUTRAL 1, NEGATIVE 0) when the zero-shot fabric
//! label clears the 0.4 text cut. Candidates are kept in the order of their
//! first counted vote; that order breaks ranking ties.

use metrics::counter;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::analyze::{
    classify_text_attributes, CategoryRequest, ClassificationMap, ClassifierInput, ColorSwatch,
    DynClassifier, DynPalette, DynSentiment, Sentiment, TextAttributes, FABRIC, FINISH, TEXTURE,
};
use crate::ingest::types::{AcceptedAsset, TextAsset};

pub const VISUAL_MIN_CONFIDENCE: f32 = 0.70;
pub const TOP_ATTRIBUTES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub fabrics: Vec<String>,
    pub textures: Vec<String>,
    pub finishes: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        let v = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            fabrics: v(&[
                "Sherpa",
                "Velvet",
                "Lino",
                "Denim",
                "Satin",
                "Metallic",
                "Leather",
                "Jersey",
                "Piel de Durazno",
                "Polilycra",
                "Piel de Conejo",
            ]),
            textures: v(&["Soft", "Rough", "Fluffy", "Smooth", "Quilted", "Wrinkled"]),
            finishes: v(&["Matte", "Shiny", "Distressed", "Sublimated", "Metallic"]),
        }
    }
}

impl Vocabulary {
    /// fabric/texture/finish request; empty lists are left out.
    pub fn attribute_request(&self) -> CategoryRequest {
        CategoryRequest::new()
            .with(FABRIC, self.fabrics.iter().cloned())
            .with(TEXTURE, self.textures.iter().cloned())
            .with(FINISH, self.finishes.iter().cloned())
    }

    pub fn has_fabric(&self, name: &str) -> bool {
        self.fabrics.iter().any(|f| f == name)
    }
}

/// Label counts in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteTally {
    entries: Vec<(String, u32)>,
}

impl VoteTally {
    pub fn add(&mut self, label: &str, n: u32) {
        match self.entries.iter_mut().find(|(l, _)| l == label) {
            Some((_, c)) => *c += n,
            None => self.entries.push((label.to_string(), n)),
        }
    }

    pub fn get(&self, label: &str) -> u32 {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    /// `n` most frequent; equal counts keep first-seen order.
    pub fn top(&self, n: usize) -> VoteTally {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        VoteTally { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(l, c)| (l.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for VoteTally {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (l, c) in &self.entries {
            map.serialize_entry(l, c)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FabricEvidence {
    pub vote_count: u32,
    pub confidence_scores: Vec<f32>,
    pub source_image_urls: Vec<String>,
    pub source_text_notes: Vec<String>,
    pub texture_votes: VoteTally,
    pub finish_votes: VoteTally,
    pub colors: Vec<ColorSwatch>,
}

impl FabricEvidence {
    /// Mean of visual confidences; 0.0 when there are none.
    pub fn mean_confidence(&self) -> f32 {
        if self.confidence_scores.is_empty() {
            return 0.0;
        }
        self.confidence_scores.iter().sum::<f32>() / self.confidence_scores.len() as f32
    }

    /// Copy for handoff: top textures/finishes, colours deduplicated by hex
    /// and truncated to `max_colors`.
    pub fn assembled(&self, max_colors: usize) -> FabricEvidence {
        let mut colors = dedup_colors(&self.colors);
        colors.truncate(max_colors);
        FabricEvidence {
            vote_count: self.vote_count,
            confidence_scores: self.confidence_scores.clone(),
            source_image_urls: self.source_image_urls.clone(),
            source_text_notes: self.source_text_notes.clone(),
            texture_votes: self.texture_votes.top(TOP_ATTRIBUTES),
            finish_votes: self.finish_votes.top(TOP_ATTRIBUTES),
            colors,
        }
    }
}

/// First swatch per exact hex, in order.
pub fn dedup_colors(colors: &[ColorSwatch]) -> Vec<ColorSwatch> {
    let mut seen = std::collections::HashSet::new();
    colors
        .iter()
        .filter(|c| seen.insert(c.hex.clone()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisualOutcome {
    Counted { fabric: String, score: f32 },
    BelowThreshold { score: f32 },
    UnknownLabel(String),
    NoFabric,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextOutcome {
    Counted { fabric: String, weight: u32 },
    NegativeSentiment { fabric: String },
    UnknownLabel(String),
    NoFabric,
}

/// Classifier/sentiment/palette handles used by the evidence pass.
#[derive(Clone)]
pub struct Analyzers {
    pub classifier: DynClassifier,
    pub sentiment: DynSentiment,
    pub palette: DynPalette,
}

#[derive(Debug, Clone, Default)]
pub struct EvidenceAggregator {
    vocabulary: Vocabulary,
    order: Vec<String>,
    evidence: HashMap<String, FabricEvidence>,
}

impl EvidenceAggregator {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self {
            vocabulary,
            order: Vec::new(),
            evidence: HashMap::new(),
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Fabric label and score if `results` would count as a visual vote.
    pub fn qualifying_fabric<'a>(&self, results: &'a ClassificationMap) -> Option<(&'a str, f32)> {
        let fabric = results.get(FABRIC)?;
        (fabric.score >= VISUAL_MIN_CONFIDENCE && self.vocabulary.has_fabric(&fabric.label))
            .then_some((fabric.label.as_str(), fabric.score))
    }

    fn entry(&mut self, fabric: &str) -> &mut FabricEvidence {
        if !self.evidence.contains_key(fabric) {
            self.order.push(fabric.to_string());
        }
        self.evidence.entry(fabric.to_string()).or_default()
    }

    pub fn add_visual(
        &mut self,
        results: &ClassificationMap,
        image_url: &str,
        palette: &[ColorSwatch],
    ) -> VisualOutcome {
        let Some(fabric) = results.get(FABRIC) else {
            return VisualOutcome::NoFabric;
        };
        if fabric.score < VISUAL_MIN_CONFIDENCE {
            return VisualOutcome::BelowThreshold {
                score: fabric.score,
            };
        }
        if !self.vocabulary.has_fabric(&fabric.label) {
            return VisualOutcome::UnknownLabel(fabric.label.clone());
        }

        let name = fabric.label.clone();
        let score = fabric.score;
        let texture = results.get(TEXTURE).map(|c| c.label.clone());
        let finish = results.get(FINISH).map(|c| c.label.clone());

        let ev = self.entry(&name);
        ev.vote_count += 1;
        ev.confidence_scores.push(score);
        ev.source_image_urls.push(image_url.to_string());
        if let Some(t) = texture.filter(|t| !t.is_empty()) {
            ev.texture_votes.add(&t, 1);
        }
        if let Some(f) = finish.filter(|f| !f.is_empty()) {
            ev.finish_votes.add(&f, 1);
        }
        ev.colors.extend_from_slice(palette);

        counter!("evidence_visual_votes_total").increment(1);
        VisualOutcome::Counted {
            fabric: name,
            score,
        }
    }

    pub fn add_text(&mut self, attrs: &TextAttributes, sentiment: Sentiment) -> TextOutcome {
        let Some(fabric) = attrs.get(FABRIC) else {
            return TextOutcome::NoFabric;
        };
        if !self.vocabulary.has_fabric(&fabric.label) {
            return TextOutcome::UnknownLabel(fabric.label.clone());
        }
        let name = fabric.label.clone();
        let weight = sentiment.vote_weight();
        if weight == 0 {
            return TextOutcome::NegativeSentiment { fabric: name };
        }

        let texture = attrs.get(TEXTURE).map(|c| c.label.clone());
        let finish = attrs.get(FINISH).map(|c| c.label.clone());

        let ev = self.entry(&name);
        ev.vote_count += weight;
        ev.source_text_notes.push(format!("Text ({})", sentiment.label()));
        if let Some(t) = texture {
            ev.texture_votes.add(&t, 1);
        }
        if let Some(f) = finish {
            ev.finish_votes.add(&f, 1);
        }

        counter!("evidence_text_votes_total").increment(u64::from(weight));
        TextOutcome::Counted {
            fabric: name,
            weight,
        }
    }

    /// Classify one accepted image/frame and fold it in. The palette is only
    /// extracted for assets that count. Collaborator errors skip the asset.
    pub async fn ingest_visual(&mut self, analyzers: &Analyzers, asset: &AcceptedAsset) -> Option<VisualOutcome> {
        let request = self.vocabulary.attribute_request();
        let results = match analyzers
            .classifier
            .classify(ClassifierInput::Image(asset.payload.as_slice()), &request)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "evidence", url = %asset.canonical_url, error = %e, "visual classify failed");
                return None;
            }
        };

        let palette = if self.qualifying_fabric(&results).is_some() {
            match analyzers.palette.extract(asset.payload.as_slice()).await {
                Ok(p) => p,
                Err(e) => {
                    debug!(target: "evidence", url = %asset.canonical_url, error = %e, "palette unavailable");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let outcome = self.add_visual(&results, &asset.canonical_url, &palette);
        debug!(target: "evidence", url = %asset.canonical_url, outcome = ?outcome, "visual evidence");
        Some(outcome)
    }

    pub async fn ingest_text(&mut self, analyzers: &Analyzers, text: &TextAsset) -> Option<TextOutcome> {
        let request = self.vocabulary.attribute_request();
        let sentiment = match analyzers.sentiment.score(&text.text).await {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "evidence", source = %text.source, error = %e, "sentiment failed");
                return None;
            }
        };
        let attrs =
            match classify_text_attributes(analyzers.classifier.as_ref(), &text.text, &request).await {
                Ok(a) => a,
                Err(e) => {
                    warn!(target: "evidence", source = %text.source, error = %e, "text classify failed");
                    return None;
                }
            };
        let outcome = self.add_text(&attrs, sentiment);
        debug!(target: "evidence", source = %text.source, outcome = ?outcome, "text evidence");
        Some(outcome)
    }

    pub fn get(&self, fabric: &str) -> Option<&FabricEvidence> {
        self.evidence.get(fabric)
    }

    /// Candidates in first-vote order.
    pub fn candidates(&self) -> impl Iterator<Item = (&str, &FabricEvidence)> {
        self.order
            .iter()
            .filter_map(|n| self.evidence.get(n).map(|e| (n.as_str(), e)))
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
