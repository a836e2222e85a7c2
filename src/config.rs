use crate::downloader::MediaFormat;
use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub download_path: PathBuf,
    pub max_concurrent_downloads: usize,
    pub preferred_format: MediaFormat,
    pub audio_bitrate_kbps: u32,
    pub cleanup_delay_secs: u64,
    pub show_notifications: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_path: dirs::download_dir().unwrap_or_else(|| PathBuf::from("./downloads")),
            max_concurrent_downloads: 5,
            preferred_format: MediaFormat::Audio,
            audio_bitrate_kbps: 192,
            cleanup_delay_secs: 10,
            show_notifications: true,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: AppConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            let config = AppConfig::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| AppError::Config("Config path has no parent directory".to_string()))?;

        if !config_dir.exists() {
            std::fs::create_dir_all(config_dir)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("xpedian-downloader").join("config.json"))
    }
}
