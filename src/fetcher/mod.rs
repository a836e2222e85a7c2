pub mod ytdlp;

use crate::downloader::MediaFormat;
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

/// Lightweight metadata for a URL, resolved without downloading content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    pub is_collection: bool,
    pub thumbnail_url: Option<String>,
}

/// Events emitted by a fetcher while a transfer runs. Progress is reported
/// at the byte level; the worker maps it to a percentage.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    Progress {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    Title(String),
}

/// The media fetch collaborator: resolves metadata, enumerates collections
/// and performs the actual transfer.
#[async_trait::async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn resolve_metadata(&self, url: &str) -> Result<MediaMetadata>;

    /// Enumerates the item URLs of a collection without downloading content.
    async fn enumerate_collection(&self, url: &str) -> Result<Vec<String>>;

    /// Downloads one item into `output_dir`, streaming events into `events`,
    /// and returns the path of the fetched asset.
    async fn fetch(
        &self,
        url: &str,
        output_dir: &Path,
        format_hint: MediaFormat,
        events: UnboundedSender<FetchEvent>,
    ) -> Result<PathBuf>;
}
