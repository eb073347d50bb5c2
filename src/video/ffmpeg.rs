// src/video/ffmpeg.rs
//! `FrameSource` backed by the ffprobe/ffmpeg binaries.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use crate::video::frame::Frame;
use crate::video::sampler::FrameSource;
use crate::video::DecodeError;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    #[serde(default)]
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    /// Display-matrix rotation wins over the legacy `rotate` tag.
    fn rotation(&self) -> i64 {
        let deg = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .unwrap_or(0.0);
        (deg.round() as i64).rem_euclid(360)
    }
}

/// Size and rate of the first video stream in ffprobe JSON. ffmpeg
/// auto-rotates on decode, so quarter turns swap width and height.
pub fn probe_geometry(json: &[u8]) -> Result<(u32, u32, f64), DecodeError> {
    let parsed: ProbeOutput =
        serde_json::from_slice(json).map_err(|e| DecodeError::Probe(e.to_string()))?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| DecodeError::Probe("no video stream".into()))?;
    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(DecodeError::Probe("missing frame size".into())),
    };
    let (width, height) = match stream.rotation() {
        90 | 270 => (height, width),
        _ => (width, height),
    };
    let fps = stream
        .r_frame_rate
        .as_deref()
        .map(parse_rate)
        .filter(|r| *r > 0.0)
        .or_else(|| stream.avg_frame_rate.as_deref().map(parse_rate))
        .unwrap_or(0.0);
    Ok((width, height, fps))
}

/// `"30000/1001"` or `"25"`; `0/0` and junk read as 0.
pub fn parse_rate(s: &str) -> f64 {
    let parsed = match s.split_once('/') {
        Some((n, d)) => match (n.trim().parse::<f64>(), d.trim().parse::<f64>()) {
            (Ok(n), Ok(d)) if d != 0.0 => n / d,
            _ => 0.0,
        },
        None => s.trim().parse::<f64>().unwrap_or(0.0),
    };
    if parsed.is_finite() && parsed > 0.0 {
        parsed
    } else {
        0.0
    }
}

pub struct FfmpegFrameSource {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    fps: f64,
    next_index: u64,
    // Removed with the source.
    _workdir: Option<tempfile::TempDir>,
}

impl FfmpegFrameSource {
    pub async fn open(
        path: &Path,
        ffmpeg_bin: &str,
        ffprobe_bin: &str,
        workdir: Option<tempfile::TempDir>,
    ) -> Result<Self, DecodeError> {
        let probe = Command::new(ffprobe_bin)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate:stream_tags=rotate:stream_side_data=rotation",
                "-of",
                "json",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await?;
        if !probe.status.success() {
            return Err(DecodeError::Tool {
                tool: "ffprobe",
                message: String::from_utf8_lossy(&probe.stderr).chars().take(200).collect(),
            });
        }
        let (width, height, fps) = probe_geometry(&probe.stdout)?;

        let mut child = Command::new(ffmpeg_bin)
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| DecodeError::Tool {
            tool: "ffmpeg",
            message: "stdout not captured".into(),
        })?;

        Ok(Self {
            child,
            stdout,
            width,
            height,
            fps,
            next_index: 0,
            _workdir: workdir,
        })
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        let size = self.width as usize * self.height as usize * 3;
        let mut buf = vec![0u8; size];
        let mut filled = 0usize;
        while filled < size {
            let n = self.stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            // Reap the decoder; a non-zero exit after full frames is ignored.
            let _ = self.child.wait().await;
            return Ok(None);
        }
        if filled < size {
            return Err(DecodeError::Corrupt(format!(
                "short frame {}: {filled} of {size} bytes",
                self.next_index
            )));
        }
        let index = self.next_index;
        self.next_index += 1;
        Frame::new(index, self.width, self.height, buf).map(Some)
    }
}
