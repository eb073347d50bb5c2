// src/video/frame.rs
//! Decoded RGB frames and their binary PPM (P6) encoding.

use crate::video::DecodeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position in the stream, 0-based.
    pub index: u64,
    pub width: u32,
    pub height: u32,
    /// Packed RGB, `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(index: u64, width: u32, height: u32, data: Vec<u8>) -> Result<Self, DecodeError> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(DecodeError::Corrupt(format!(
                "frame {index}: {} bytes for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            index,
            width,
            height,
            data,
        })
    }

    /// Solid-colour frame.
    pub fn filled(index: u64, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            index,
            width,
            height,
            data,
        }
    }

    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|c| [c[0], c[1], c[2]])
    }
}

pub fn is_ppm(payload: &[u8]) -> bool {
    payload.starts_with(b"P6")
}

pub fn encode_ppm(frame: &Frame) -> Vec<u8> {
    let header = format!("P6\n{} {}\n255\n", frame.width, frame.height);
    let mut out = Vec::with_capacity(header.len() + frame.data.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&frame.data);
    out
}

/// Reads a P6 header (comments allowed, maxval 255 only) and the pixel block.
pub fn decode_ppm(payload: &[u8], index: u64) -> Result<Frame, DecodeError> {
    if !is_ppm(payload) {
        return Err(DecodeError::Corrupt("missing P6 magic".into()));
    }
    let mut pos = 2usize;
    let mut fields = [0u32; 3];
    for field in fields.iter_mut() {
        // whitespace and comments
        loop {
            match payload.get(pos) {
                Some(b) if b.is_ascii_whitespace() => pos += 1,
                Some(b'#') => {
                    while payload.get(pos).is_some_and(|b| *b != b'\n') {
                        pos += 1;
                    }
                }
                _ => break,
            }
        }
        let start = pos;
        while payload.get(pos).is_some_and(u8::is_ascii_digit) {
            pos += 1;
        }
        *field = std::str::from_utf8(&payload[start..pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| DecodeError::Corrupt("bad PPM header".into()))?;
    }
    if fields[2] != 255 {
        return Err(DecodeError::Corrupt(format!("unsupported maxval {}", fields[2])));
    }
    // single whitespace byte before the raster
    if !payload.get(pos).is_some_and(u8::is_ascii_whitespace) {
        return Err(DecodeError::Corrupt("bad PPM header terminator".into()));
    }
    pos += 1;
    Frame::new(index, fields[0], fields[1], payload[pos..].to_vec())
}
