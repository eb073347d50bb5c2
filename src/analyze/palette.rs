// src/analyze/palette.rs
//! Dominant colours of an image, each matched to the nearest entry of a small
//! Pantone TCX reference table.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analyze::ClassifierError;
use crate::video::frame::{decode_ppm, is_ppm};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorSwatch {
    /// Lower-case `#rrggbb`.
    pub hex: String,
    pub rgb: (u8, u8, u8),
    /// Share of pixels in this cluster, 0..=1, rounded to 4 decimals.
    pub percentage: f32,
    pub pantone_code: String,
    pub pantone_name: String,
}

impl ColorSwatch {
    pub fn from_rgb(rgb: (u8, u8, u8), percentage: f32) -> Self {
        let reference = nearest_reference(rgb);
        Self {
            hex: to_hex(rgb),
            rgb,
            percentage: (percentage * 10_000.0).round() / 10_000.0,
            pantone_code: reference.code.to_string(),
            pantone_name: reference.name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PantoneRef {
    pub code: &'static str,
    pub name: &'static str,
    pub rgb: (u8, u8, u8),
}

const fn p(code: &'static str, name: &'static str, rgb: (u8, u8, u8)) -> PantoneRef {
    PantoneRef { code, name, rgb }
}

/// Fashion/home subset of the TCX catalogue.
pub const PANTONE_TCX: [PantoneRef; 27] = [
    p("11-0601 TCX", "Bright White", (244, 249, 255)),
    p("19-4007 TCX", "Anthracite", (40, 40, 40)),
    p("11-4001 TCX", "Brilliant White", (240, 240, 250)),
    p("13-1006 TCX", "Creme Brulee", (219, 204, 181)),
    p("16-1546 TCX", "Living Coral", (255, 111, 97)),
    p("18-3838 TCX", "Ultra Violet", (95, 75, 139)),
    p("19-4052 TCX", "Classic Blue", (15, 76, 129)),
    p("17-5104 TCX", "Ultimate Gray", (147, 149, 151)),
    p("13-0647 TCX", "Illuminating", (245, 223, 77)),
    p("15-0343 TCX", "Greenery", (136, 176, 75)),
    p("18-1438 TCX", "Marsala", (150, 79, 76)),
    p("18-3224 TCX", "Radiant Orchid", (173, 94, 153)),
    p("17-5641 TCX", "Emerald", (0, 148, 115)),
    p("17-1463 TCX", "Tangerine Tango", (221, 65, 36)),
    p("18-2120 TCX", "Honeysuckle", (214, 80, 118)),
    p("15-5519 TCX", "Turquoise", (69, 181, 170)),
    p("14-0848 TCX", "Mimosa", (240, 192, 90)),
    p("18-3943 TCX", "Blue Iris", (90, 91, 159)),
    p("19-1557 TCX", "Chili Pepper", (155, 27, 48)),
    p("13-1106 TCX", "Sand Dollar", (222, 205, 190)),
    p("19-0303 TCX", "Jet Black", (45, 44, 47)),
    p("19-4005 TCX", "Stretch Limo", (43, 46, 52)),
    p("11-0103 TCX", "Egret", (243, 236, 224)),
    p("14-1118 TCX", "Beige", (212, 184, 149)),
    p("16-1325 TCX", "Copper", (184, 115, 51)),
    p("17-2031 TCX", "Fuchsia", (193, 84, 193)),
    p("19-1664 TCX", "True Red", (191, 25, 50)),
];

/// Euclidean nearest neighbour in RGB. First entry wins on ties.
pub fn nearest_reference(rgb: (u8, u8, u8)) -> &'static PantoneRef {
    let mut best = &PANTONE_TCX[0];
    let mut best_d = u32::MAX;
    for r in PANTONE_TCX.iter() {
        let d = dist2(rgb, r.rgb);
        if d < best_d {
            best_d = d;
            best = r;
        }
    }
    best
}

fn dist2(a: (u8, u8, u8), b: (u8, u8, u8)) -> u32 {
    let dr = a.0 as i32 - b.0 as i32;
    let dg = a.1 as i32 - b.1 as i32;
    let db = a.2 as i32 - b.2 as i32;
    (dr * dr + dg * dg + db * db) as u32
}

pub fn to_hex(rgb: (u8, u8, u8)) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb.0, rgb.1, rgb.2)
}

/// Pixels kept after down-sampling a frame for clustering.
const MAX_SAMPLED_PIXELS: usize = 4_096;

#[async_trait]
pub trait PaletteExtractor: Send + Sync {
    /// Dominant colours, most prevalent first.
    async fn extract(&self, payload: &[u8]) -> Result<Vec<ColorSwatch>, ClassifierError>;
    fn name(&self) -> &'static str;
}

pub type DynPalette = Arc<dyn PaletteExtractor>;

/// In-process k-means over decoded RGB pixels. Only understands the PPM
/// frames written by the sampler; other encodings go to the model server.
#[derive(Debug, Clone)]
pub struct KMeansPalette {
    clusters: usize,
    iterations: usize,
}

impl Default for KMeansPalette {
    fn default() -> Self {
        Self::new(3)
    }
}

impl KMeansPalette {
    pub const ITERATIONS: usize = 10;

    pub fn new(clusters: usize) -> Self {
        Self {
            clusters: clusters.max(1),
            iterations: Self::ITERATIONS,
        }
    }

    /// Cluster raw RGB triples. Empty input yields an empty palette.
    pub fn cluster(&self, pixels: &[[u8; 3]]) -> Vec<ColorSwatch> {
        if pixels.is_empty() {
            return Vec::new();
        }
        let mut centroids = luminance_seeds(pixels, self.clusters);
        let mut assignment = vec![0usize; pixels.len()];

        for _ in 0..self.iterations {
            let mut changed = false;
            for (i, px) in pixels.iter().enumerate() {
                let c = nearest_centroid(&centroids, px);
                if assignment[i] != c {
                    assignment[i] = c;
                    changed = true;
                }
            }
            let mut sums = vec![[0u64; 3]; centroids.len()];
            let mut counts = vec![0u64; centroids.len()];
            for (px, &c) in pixels.iter().zip(assignment.iter()) {
                for ch in 0..3 {
                    sums[c][ch] += px[ch] as u64;
                }
                counts[c] += 1;
            }
            for (c, centroid) in centroids.iter_mut().enumerate() {
                if counts[c] > 0 {
                    for ch in 0..3 {
                        centroid[ch] = sums[c][ch] as f32 / counts[c] as f32;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        let mut counts = vec![0usize; centroids.len()];
        for &c in &assignment {
            counts[c] += 1;
        }
        let total = pixels.len() as f32;
        let mut out: Vec<ColorSwatch> = centroids
            .iter()
            .zip(counts.iter())
            .filter(|(_, &n)| n > 0)
            .map(|(c, &n)| {
                let rgb = (
                    c[0].round().clamp(0.0, 255.0) as u8,
                    c[1].round().clamp(0.0, 255.0) as u8,
                    c[2].round().clamp(0.0, 255.0) as u8,
                );
                ColorSwatch::from_rgb(rgb, n as f32 / total)
            })
            .collect();
        out.sort_by(|a, b| {
            b.percentage
                .partial_cmp(&a.percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }
}

#[async_trait]
impl PaletteExtractor for KMeansPalette {
    async fn extract(&self, payload: &[u8]) -> Result<Vec<ColorSwatch>, ClassifierError> {
        if !is_ppm(payload) {
            return Err(ClassifierError::Unsupported(
                "k-means palette only decodes PPM frames".into(),
            ));
        }
        let frame = decode_ppm(payload, 0)
            .map_err(|e| ClassifierError::Unsupported(e.to_string()))?;
        let total = frame.data.len() / 3;
        let stride = (total / MAX_SAMPLED_PIXELS).max(1);
        let pixels: Vec<[u8; 3]> = frame
            .data
            .chunks_exact(3)
            .step_by(stride)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        Ok(self.cluster(&pixels))
    }

    fn name(&self) -> &'static str {
        "kmeans"
    }
}

/// Seeds spread evenly over the luminance-sorted pixels, so runs are
/// deterministic.
fn luminance_seeds(pixels: &[[u8; 3]], k: usize) -> Vec<[f32; 3]> {
    let mut sorted: Vec<&[u8; 3]> = pixels.iter().collect();
    sorted.sort_by_key(|px| luminance(px));
    let k = k.min(sorted.len()).max(1);
    (0..k)
        .map(|i| {
            let idx = if k == 1 {
                sorted.len() / 2
            } else {
                i * (sorted.len() - 1) / (k - 1)
            };
            let px = sorted[idx];
            [px[0] as f32, px[1] as f32, px[2] as f32]
        })
        .collect()
}

fn luminance(px: &[u8; 3]) -> u32 {
    299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32
}

fn nearest_centroid(centroids: &[[f32; 3]], px: &[u8; 3]) -> usize {
    let mut best = 0;
    let mut best_d = f32::MAX;
    for (i, c) in centroids.iter().enumerate() {
        let d = (0..3)
            .map(|ch| {
                let v = px[ch] as f32 - c[ch];
                v * v
            })
            .sum::<f32>();
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}
