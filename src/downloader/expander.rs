use crate::errors::{AppError, Result};
use crate::fetcher::MediaFetcher;
use std::sync::Arc;
use url::Url;

/// Expands a submitted URL into individual item URLs.
///
/// A collection URL (playlist) is resolved through the fetch collaborator's
/// listing capability before any job is created; a plain URL yields itself.
/// Expansion is all-or-nothing: a failed or empty enumeration produces zero
/// jobs and a single error.
pub struct PlaylistExpander {
    fetcher: Arc<dyn MediaFetcher>,
}

/// URL-shape predicate for collections: a `list` query parameter or a
/// `/playlist` path segment.
pub fn is_collection_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            parsed.query_pairs().any(|(key, _)| key == "list")
                || parsed.path().contains("/playlist")
        }
        Err(_) => false,
    }
}

impl PlaylistExpander {
    pub fn new(fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn expand(&self, url: &str) -> Result<Vec<String>> {
        if !is_collection_url(url) {
            return Ok(vec![url.to_string()]);
        }

        let children = self
            .fetcher
            .enumerate_collection(url)
            .await
            .map_err(|e| AppError::Expansion(format!("Could not enumerate {}: {}", url, e)))?;

        if children.is_empty() {
            return Err(AppError::Expansion(format!(
                "Collection {} contains no items",
                url
            )));
        }

        Ok(children)
    }
}
