// src/video/ytdlp.rs
//! `VideoSource` over the yt-dlp binary.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::video::ffmpeg::FfmpegFrameSource;
use crate::video::hunt::{VideoEntry, VideoSource};
use crate::video::sampler::FrameSource;
use crate::video::DecodeError;

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
}

/// One JSON object per line, as printed by `--dump-json --flat-playlist`.
pub fn parse_search_output(stdout: &str) -> Vec<VideoEntry> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<FlatEntry>(l).ok())
        .filter_map(|e| {
            let id = e.id?;
            let url = e.webpage_url.or(e.url).unwrap_or_else(|| id.clone());
            Some(VideoEntry {
                id,
                url,
                title: e.title,
                duration_secs: e.duration,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct YtDlpVideoSource {
    name: String,
    ytdlp_bin: String,
    ffmpeg_bin: String,
    ffprobe_bin: String,
    /// Appended to every search, e.g. `#shorts`.
    query_suffix: String,
    timeout: Duration,
}

impl YtDlpVideoSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ytdlp_bin: "yt-dlp".into(),
            ffmpeg_bin: "ffmpeg".into(),
            ffprobe_bin: "ffprobe".into(),
            query_suffix: "#shorts".into(),
            timeout: Duration::from_secs(180),
        }
    }

    pub fn with_binaries(mut self, ytdlp: &str, ffmpeg: &str, ffprobe: &str) -> Self {
        self.ytdlp_bin = ytdlp.into();
        self.ffmpeg_bin = ffmpeg.into();
        self.ffprobe_bin = ffprobe.into();
        self
    }

    pub fn with_query_suffix(mut self, suffix: &str) -> Self {
        self.query_suffix = suffix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn search_query(&self, tag: &str, max_results: usize) -> String {
        let q = format!("{} {}", tag.trim(), self.query_suffix.trim());
        format!("ytsearch{}:{}", max_results.max(1), q.trim())
    }

    async fn run(&self, cmd: &mut Command) -> Result<std::process::Output, DecodeError> {
        let output = tokio::time::timeout(self.timeout, cmd.kill_on_drop(true).output())
            .await
            .map_err(|_| DecodeError::Tool {
                tool: "yt-dlp",
                message: "timed out".into(),
            })??;
        if !output.status.success() {
            return Err(DecodeError::Tool {
                tool: "yt-dlp",
                message: String::from_utf8_lossy(&output.stderr).chars().take(200).collect(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl VideoSource for YtDlpVideoSource {
    async fn search(&self, tag: &str, max_results: usize) -> Result<Vec<VideoEntry>, DecodeError> {
        let query = self.search_query(tag, max_results);
        let output = self
            .run(
                Command::new(&self.ytdlp_bin)
                    .args(["--dump-json", "--flat-playlist", "--no-warnings"])
                    .arg(&query),
            )
            .await?;
        let entries = parse_search_output(&String::from_utf8_lossy(&output.stdout));
        debug!(target: "frames", query = %query, found = entries.len(), "video search done");
        Ok(entries)
    }

    async fn open(&self, entry: &VideoEntry) -> Result<Box<dyn FrameSource>, DecodeError> {
        let workdir = tempfile::tempdir()?;
        let template = workdir.path().join("%(id)s.%(ext)s");
        self.run(
            Command::new(&self.ytdlp_bin)
                .args(["-f", "best[ext=mp4]/best", "--no-playlist", "--quiet", "-o"])
                .arg(&template)
                .arg(&entry.url),
        )
        .await?;

        let file = std::fs::read_dir(workdir.path())?
            .flatten()
            .map(|e| e.path())
            .find(|p| p.is_file())
            .ok_or_else(|| DecodeError::Tool {
                tool: "yt-dlp",
                message: format!("no file downloaded for {}", entry.id),
            })?;

        let source =
            FfmpegFrameSource::open(&file, &self.ffmpeg_bin, &self.ffprobe_bin, Some(workdir))
                .await?;
        Ok(Box::new(source))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
