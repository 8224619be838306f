//! Remote media acquisition.

use async_trait::async_trait;
use futures::StreamExt;
use reel_media::{remove_file_quietly, JobContext, MediaError};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::ProviderError;
use crate::providers::status_error;

/// Fetches a remote media URL to a local file.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Write the resource at `url` to `dest`. On success `dest` exists and is
    /// non-empty.
    async fn fetch(&self, url: &str, dest: &Path, ctx: &JobContext) -> Result<(), ProviderError>;
}

/// Streams HTTP(S) downloads to disk.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn download(&self, url: &str, partial: &Path) -> Result<u64, ProviderError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(status_error("download", response).await);
        }

        let mut file = tokio::fs::File::create(partial).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path, ctx: &JobContext) -> Result<(), ProviderError> {
        let parsed =
            url::Url::parse(url).map_err(|_| ProviderError::UnsupportedSource(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProviderError::UnsupportedSource(url.to_string()));
        }

        let partial = partial_path(dest);
        let result = ctx.run(self.download(url, &partial)).await;
        let written = match result {
            Ok(written) => written,
            Err(e) => {
                remove_file_quietly(&partial).await;
                return Err(e);
            }
        };
        if written == 0 {
            remove_file_quietly(&partial).await;
            return Err(MediaError::EmptyOutput(dest.to_path_buf()).into());
        }

        tokio::fs::rename(&partial, dest).await?;
        debug!(url, bytes = written, dest = ?dest, "Downloaded media");
        Ok(())
    }
}
