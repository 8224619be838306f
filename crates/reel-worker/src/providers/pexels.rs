use async_trait::async_trait;
use reel_media::JobContext;
use reel_models::Orientation;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{status_error, StockMediaProvider};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

const NAME: &str = "pexels";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    #[serde(default)]
    quality: Option<String>,
    link: String,
}

impl Video {
    /// The HD rendition, else the first file listed.
    fn best_link(&self) -> Option<&str> {
        self.video_files
            .iter()
            .find(|f| f.quality.as_deref() == Some("hd"))
            .or_else(|| self.video_files.first())
            .map(|f| f.link.as_str())
            .filter(|link| !link.is_empty())
    }
}

/// Pexels video search.
pub struct PexelsProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    per_page: u32,
}

impl PexelsProvider {
    pub fn new(client: Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            api_key: config.pexels_api_key.clone(),
            base_url: config.pexels_base_url.trim_end_matches('/').to_string(),
            per_page: config.per_page,
        }
    }
}

#[async_trait]
impl StockMediaProvider for PexelsProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(
        &self,
        query: &str,
        orientation: Orientation,
        ctx: &JobContext,
    ) -> Result<Vec<String>, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::NotConfigured(NAME))?;
        let url = format!("{}/videos/search", self.base_url);
        let per_page = self.per_page.to_string();

        ctx.run(async {
            let response = self
                .client
                .get(&url)
                .header(reqwest::header::AUTHORIZATION, api_key)
                .query(&[
                    ("query", query),
                    ("per_page", per_page.as_str()),
                    ("orientation", orientation.as_str()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(status_error(NAME, response).await);
            }

            let body: SearchResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
            let links: Vec<String> = body
                .videos
                .iter()
                .filter_map(Video::best_link)
                .map(str::to_string)
                .collect();
            debug!(provider = NAME, query, results = links.len(), "Stock search complete");
            Ok(links)
        })
        .await
    }
}
