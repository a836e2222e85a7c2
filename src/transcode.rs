use crate::downloader::MediaFormat;
use crate::errors::{AppError, Result};
use std::path::{Path, PathBuf};

/// Post-processing collaborator: converts a fetched asset into the
/// requested output format.
#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        input: &Path,
        target: MediaFormat,
        bitrate_kbps: u32,
    ) -> Result<PathBuf>;
}

/// Transcoder backed by an `ffmpeg` subprocess.
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::with_binary(PathBuf::from("ffmpeg"))
    }

    /// Uses an explicit ffmpeg binary instead of the PATH lookup.
    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    pub async fn is_available(&self) -> bool {
        tokio::process::Command::new(&self.binary)
            .arg("-version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        target: MediaFormat,
        bitrate_kbps: u32,
    ) -> Result<PathBuf> {
        let output = input.with_extension(target.extension());
        if output == input {
            return Err(AppError::Transcode(format!(
                "Asset {:?} is already in the target format",
                input
            )));
        }

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("-y").arg("-i").arg(input);
        match target {
            MediaFormat::Audio => {
                cmd.args(["-vn", "-codec:a", "libmp3lame"])
                    .arg("-b:a")
                    .arg(format!("{}k", bitrate_kbps));
            }
            MediaFormat::Video => {
                cmd.args(["-codec", "copy"]);
            }
        }
        cmd.arg(&output);

        let result = cmd
            .output()
            .await
            .map_err(|e| AppError::Transcode(format!("Failed to start ffmpeg: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let reason = stderr.lines().last().unwrap_or("unknown ffmpeg error");
            return Err(AppError::Transcode(format!(
                "ffmpeg exited with {}: {}",
                result.status, reason
            )));
        }

        Ok(output)
    }
}
