use async_trait::async_trait;
use reel_media::JobContext;
use reel_models::Orientation;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{status_error, StockMediaProvider};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

const NAME: &str = "pixabay";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    videos: Renditions,
}

#[derive(Debug, Default, Deserialize)]
struct Renditions {
    large: Option<Rendition>,
    medium: Option<Rendition>,
}

#[derive(Debug, Deserialize)]
struct Rendition {
    #[serde(default)]
    url: String,
}

impl Renditions {
    fn best_url(&self) -> Option<&str> {
        [&self.large, &self.medium]
            .into_iter()
            .flatten()
            .map(|r| r.url.as_str())
            .find(|url| !url.is_empty())
    }
}

/// Pixabay video search.
pub struct PixabayProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    per_page: u32,
}

impl PixabayProvider {
    pub fn new(client: Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            api_key: config.pixabay_api_key.clone(),
            base_url: config.pixabay_base_url.trim_end_matches('/').to_string(),
            per_page: config.per_page,
        }
    }
}

#[async_trait]
impl StockMediaProvider for PixabayProvider {
    fn name(&self) -> &str {
        NAME
    }

    /// Pixabay has no orientation filter for videos.
    async fn search(
        &self,
        query: &str,
        _orientation: Orientation,
        ctx: &JobContext,
    ) -> Result<Vec<String>, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::NotConfigured(NAME))?;
        let url = format!("{}/api/videos/", self.base_url);
        let per_page = self.per_page.to_string();

        ctx.run(async {
            let response = self
                .client
                .get(&url)
                .query(&[("key", api_key), ("q", query), ("per_page", per_page.as_str())])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(status_error(NAME, response).await);
            }

            let body: SearchResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
            let urls: Vec<String> = body
                .hits
                .iter()
                .filter_map(|hit| hit.videos.best_url())
                .map(str::to_string)
                .collect();
            debug!(provider = NAME, query, results = urls.len(), "Stock search complete");
            Ok(urls)
        })
        .await
    }
}
