//! Tiered visual media resolution for a scene.

use reel_media::JobContext;
use reel_models::{MediaCandidate, MediaTier, Orientation};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dedup::DedupSet;
use crate::error::{PipelineError, PipelineResult, ProviderError};
use crate::keywords;
use crate::metrics;
use crate::providers::StockMediaProvider;
use crate::retry::RetryPolicy;

/// Placeholder policy for one job.
#[derive(Debug, Clone)]
pub struct PlaceholderOptions {
    pub allow: bool,
    /// Caller-supplied placeholder URL
    pub custom_url: Option<String>,
    /// Configured local placeholder asset
    pub default_path: PathBuf,
}

impl PlaceholderOptions {
    /// Best placeholder available, if placeholders are allowed.
    pub async fn candidate(&self) -> Option<MediaCandidate> {
        if !self.allow {
            return None;
        }
        if let Some(url) = &self.custom_url {
            return Some(MediaCandidate::new(url.clone(), MediaTier::CustomPlaceholder));
        }
        self.default_candidate().await
    }

    /// The local placeholder asset, if allowed and present on disk.
    pub async fn default_candidate(&self) -> Option<MediaCandidate> {
        if !self.allow {
            return None;
        }
        match tokio::fs::try_exists(&self.default_path).await {
            Ok(true) => Some(MediaCandidate::new(
                self.default_path.to_string_lossy().into_owned(),
                MediaTier::DefaultPlaceholder,
            )),
            _ => {
                warn!(path = ?self.default_path, "Default placeholder asset is missing");
                None
            }
        }
    }
}

/// Walks custom media, stock providers and placeholders in order.
pub struct MediaResolver {
    providers: Vec<Arc<dyn StockMediaProvider>>,
    retry: RetryPolicy,
    keyword_limit: usize,
}

impl MediaResolver {
    /// `providers` are queried in order for each keyword variant.
    pub fn new(
        providers: Vec<Arc<dyn StockMediaProvider>>,
        retry: RetryPolicy,
        keyword_limit: usize,
    ) -> Self {
        Self {
            providers,
            retry,
            keyword_limit,
        }
    }

    /// Pick the visual source for one scene.
    ///
    /// Stock hits are claimed in `dedup` so no two scenes of the job share
    /// one. When every hit was already claimed and no placeholder is usable,
    /// the first hit is handed out again rather than failing the scene.
    #[allow(clippy::too_many_arguments)]
    pub async fn resolve(
        &self,
        index: usize,
        text: &str,
        custom_url: Option<&str>,
        orientation: Orientation,
        dedup: &DedupSet,
        placeholders: &PlaceholderOptions,
        ctx: &JobContext,
    ) -> PipelineResult<MediaCandidate> {
        if let Some(url) = custom_url {
            debug!(scene = index, url, "Using custom media");
            return Ok(self.chosen(index, MediaCandidate::new(url, MediaTier::Custom)));
        }

        let mut first_used: Option<String> = None;
        let mut skipped: HashSet<usize> = HashSet::new();

        for query in keywords::search_queries(text, self.keyword_limit) {
            for (slot, provider) in self.providers.iter().enumerate() {
                if skipped.contains(&slot) {
                    continue;
                }
                ctx.check()?;

                let urls = match self.search(provider.as_ref(), &query, orientation, ctx).await {
                    Ok(urls) => urls,
                    Err(ProviderError::Media(e)) if e.is_interruption() => return Err(e.into()),
                    Err(ProviderError::NotConfigured(name)) => {
                        debug!(provider = name, "Provider not configured, skipping");
                        skipped.insert(slot);
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            scene = index,
                            provider = provider.name(),
                            query = %query,
                            error = %e,
                            "Stock search failed"
                        );
                        metrics::record_provider_error(provider.name());
                        continue;
                    }
                };

                for url in urls {
                    if dedup.try_claim(&url) {
                        info!(
                            scene = index,
                            provider = provider.name(),
                            query = %query,
                            "Selected stock media"
                        );
                        return Ok(self.chosen(index, MediaCandidate::new(url, MediaTier::Stock)));
                    }
                    first_used.get_or_insert(url);
                }
            }
        }

        if let Some(candidate) = placeholders.candidate().await {
            info!(scene = index, tier = candidate.tier.as_str(), "No unused stock media, using placeholder");
            return Ok(self.chosen(index, candidate));
        }

        if let Some(url) = first_used {
            warn!(scene = index, url = %url, "Every stock hit already used, reusing one");
            metrics::record_media_reused();
            return Ok(self.chosen(index, MediaCandidate::reused(url)));
        }

        Err(PipelineError::NoMediaAvailable { index })
    }

    async fn search(
        &self,
        provider: &dyn StockMediaProvider,
        query: &str,
        orientation: Orientation,
        ctx: &JobContext,
    ) -> Result<Vec<String>, ProviderError> {
        let operation = format!("search_{}", provider.name());
        self.retry
            .run(&operation, ctx, || provider.search(query, orientation, ctx))
            .await
            .into_result()
    }

    fn chosen(&self, index: usize, candidate: MediaCandidate) -> MediaCandidate {
        debug!(scene = index, tier = candidate.tier.as_str(), "Media resolved");
        metrics::record_media_tier(candidate.tier.as_str());
        candidate
    }
}
