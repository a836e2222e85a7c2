use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Expansion error: {0}")]
    Expansion(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Transcode error: {0}")]
    Transcode(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
