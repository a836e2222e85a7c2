use crate::downloader::MediaFormat;
use crate::errors::{AppError, Result};
use crate::fetcher::{FetchEvent, MediaFetcher, MediaMetadata};
use log::{debug, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

/// Media fetch collaborator backed by a `yt-dlp` subprocess.
///
/// Metadata and playlist listings use `-J --flat-playlist` (no content is
/// downloaded); transfers stream byte-level progress through a custom
/// `--progress-template` so each emitted line is machine-parseable.
pub struct YtDlpFetcher {
    binary: PathBuf,
    progress_re: Regex,
}

const PROGRESS_TEMPLATE: &str =
    "download:progress:%(progress.downloaded_bytes)s/%(progress.total_bytes)s";

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::with_binary(PathBuf::from("yt-dlp"))
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            progress_re: Regex::new(r"^progress:(\d+)(?:\.\d+)?/(\d+(?:\.\d+)?|NA)$")
                .expect("static regex"),
        }
    }

    fn parse_progress_line(&self, line: &str) -> Option<FetchEvent> {
        let caps = self.progress_re.captures(line.trim())?;
        let downloaded_bytes = caps[1].parse().ok()?;
        let total_bytes = match &caps[2] {
            "NA" => None,
            // yt-dlp sometimes reports fractional byte counts
            total => total.split('.').next().and_then(|t| t.parse().ok()),
        };
        Some(FetchEvent::Progress {
            downloaded_bytes,
            total_bytes,
        })
    }

    async fn dump_json(&self, url: &str) -> Result<serde_json::Value> {
        let output = Command::new(&self.binary)
            .args(["-J", "--flat-playlist", "--no-warnings"])
            .arg(url)
            .output()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to start yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Fetch(format!(
                "yt-dlp metadata query failed: {}",
                stderr.lines().last().unwrap_or("unknown error")
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn metadata_from_json(value: &serde_json::Value, url: &str) -> MediaMetadata {
    MediaMetadata {
        title: value
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or(url)
            .to_string(),
        is_collection: value.get("_type").and_then(|t| t.as_str()) == Some("playlist"),
        thumbnail_url: value
            .get("thumbnail")
            .and_then(|t| t.as_str())
            .map(str::to_string),
    }
}

fn entries_from_json(value: &serde_json::Value) -> Vec<String> {
    value
        .get("entries")
        .and_then(|e| e.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    entry
                        .get("url")
                        .or_else(|| entry.get("webpage_url"))
                        .and_then(|u| u.as_str())
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn format_selector(format: MediaFormat) -> &'static str {
    match format {
        MediaFormat::Audio => "bestaudio/best",
        MediaFormat::Video => "bestvideo+bestaudio/best",
    }
}

#[async_trait::async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn resolve_metadata(&self, url: &str) -> Result<MediaMetadata> {
        let json = self.dump_json(url).await?;
        Ok(metadata_from_json(&json, url))
    }

    async fn enumerate_collection(&self, url: &str) -> Result<Vec<String>> {
        let json = self.dump_json(url).await?;
        Ok(entries_from_json(&json))
    }

    async fn fetch(
        &self,
        url: &str,
        output_dir: &Path,
        format_hint: MediaFormat,
        events: UnboundedSender<FetchEvent>,
    ) -> Result<PathBuf> {
        // Title metadata is resolved up front so it reaches the registry
        // before the transfer finishes. Failure here is not fatal.
        match self.resolve_metadata(url).await {
            Ok(metadata) => {
                let _ = events.send(FetchEvent::Title(metadata.title));
            }
            Err(e) => warn!("Could not resolve title for {}: {}", url, e),
        }

        let output_template = output_dir.join("%(title)s.%(ext)s");
        let mut child = Command::new(&self.binary)
            .args(["--newline", "--no-warnings", "--progress"])
            .args(["--progress-template", PROGRESS_TEMPLATE])
            .args(["--print", "after_move:filepath"])
            .args(["-f", format_selector(format_hint)])
            .arg("-o")
            .arg(&output_template)
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::Fetch(format!("Failed to start yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Fetch("yt-dlp stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Fetch("yt-dlp stderr not captured".to_string()))?;

        // Drain stderr concurrently so the child never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut final_path: Option<PathBuf> = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to read yt-dlp output: {}", e)))?
        {
            if let Some(event) = self.parse_progress_line(&line) {
                let _ = events.send(event);
            } else if !line.trim().is_empty() {
                // The only other printed line is the final file path.
                final_path = Some(PathBuf::from(line.trim()));
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to wait for yt-dlp: {}", e)))?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            debug!("yt-dlp stderr: {}", stderr_text);
            return Err(AppError::Fetch(format!(
                "yt-dlp exited with {}: {}",
                status,
                stderr_text.lines().last().unwrap_or("unknown error")
            )));
        }

        final_path
            .ok_or_else(|| AppError::Fetch("yt-dlp did not report an output file".to_string()))
    }
}
