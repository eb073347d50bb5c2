// src/video/histogram.rs
//! Hue/saturation histogram and correlation, with the 8-bit HSV convention
//! (H in 0..180, S in 0..256).
//!
//! Ignores value/brightness and layout, so the same outfit in another pose
//! still correlates highly while a different garment colour does not.

use crate::video::frame::Frame;

pub const H_BINS: usize = 50;
pub const S_BINS: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct HsHistogram {
    bins: Vec<f32>,
}

/// 8-bit HSV: H in [0,180), S in [0,255].
pub fn rgb_to_hs(px: [u8; 3]) -> (f32, f32) {
    let r = px[0] as f32;
    let g = px[1] as f32;
    let b = px[2] as f32;
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;
    let s = if v > 0.0 { 255.0 * delta / v } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / delta
    } else if v == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };
    (h / 2.0, s)
}

impl HsHistogram {
    pub fn of_frame(frame: &Frame) -> Self {
        let mut bins = vec![0f32; H_BINS * S_BINS];
        for px in frame.pixels() {
            let (h, s) = rgb_to_hs(px);
            let hb = ((h / 180.0) * H_BINS as f32) as usize;
            let sb = ((s / 256.0) * S_BINS as f32) as usize;
            bins[hb.min(H_BINS - 1) * S_BINS + sb.min(S_BINS - 1)] += 1.0;
        }
        let mut hist = Self { bins };
        hist.normalize_min_max();
        hist
    }

    /// Scale bins into [0,1].
    fn normalize_min_max(&mut self) {
        let min = self.bins.iter().copied().fold(f32::INFINITY, f32::min);
        let max = self.bins.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;
        if range > 0.0 {
            for b in self.bins.iter_mut() {
                *b = (*b - min) / range;
            }
        } else {
            self.bins.iter_mut().for_each(|b| *b = 0.0);
        }
    }

    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    /// Pearson correlation of the bin vectors. Two flat histograms correlate
    /// as 1.0.
    pub fn correlation(&self, other: &HsHistogram) -> f64 {
        let n = self.bins.len().min(other.bins.len()) as f64;
        if n == 0.0 {
            return 0.0;
        }
        let mean_a = self.bins.iter().map(|&x| x as f64).sum::<f64>() / n;
        let mean_b = other.bins.iter().map(|&x| x as f64).sum::<f64>() / n;
        let mut num = 0.0;
        let mut da = 0.0;
        let mut db = 0.0;
        for (&a, &b) in self.bins.iter().zip(other.bins.iter()) {
            let xa = a as f64 - mean_a;
            let xb = b as f64 - mean_b;
            num += xa * xb;
            da += xa * xa;
            db += xb * xb;
        }
        let denom = (da * db).sqrt();
        if denom.abs() < f64::EPSILON {
            1.0
        } else {
            num / denom
        }
    }
}
