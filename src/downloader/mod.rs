pub mod batch;
pub mod cleanup;
pub mod expander;
pub mod manager;
pub mod pool;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Audio,
    Video,
}

impl MediaFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Audio => "mp3",
            MediaFormat::Video => "mp4",
        }
    }
}

impl std::str::FromStr for MediaFormat {
    type Err = crate::errors::AppError;

    fn from_str(s: &str) -> crate::errors::Result<Self> {
        match s.to_lowercase().as_str() {
            "audio" | "mp3" => Ok(MediaFormat::Audio),
            "video" | "mp4" => Ok(MediaFormat::Video),
            other => Err(crate::errors::AppError::InvalidInput(format!(
                "Unknown format: {} (expected audio or video)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One unit of work: a single media item's download and optional conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub source_url: String,
    pub output_target: PathBuf,
    pub requested_format: MediaFormat,
    pub state: JobState,
    pub progress_percent: f32,
    pub display_title: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Job {
    pub fn new(id: String, source_url: String, output_target: PathBuf, format: MediaFormat) -> Self {
        Self {
            id,
            source_url,
            output_target,
            requested_format: format,
            state: JobState::Pending,
            progress_percent: 0.0,
            display_title: None,
            error_detail: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Failed)
    }
}

/// A single submission as entered by the user, before playlist expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
    pub output_target: PathBuf,
    pub format: MediaFormat,
}
