use crate::errors::Result;
use log::info;

/// Generates a unique ID for jobs
pub fn generate_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// sanitize_filename removed - output naming is handled by yt-dlp's template

/// Creates a directory if it doesn't exist
pub async fn ensure_dir_exists(path: &std::path::Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(generate_job_id(), generate_job_id());
    }
}
