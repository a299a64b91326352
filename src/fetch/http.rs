use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::Fetcher;
use crate::config::FetchConfig;
use crate::error::FetchError;

/// Wrapper around a reqwest client that streams response bodies to disk
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher honoring the configured timeout and user agent
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(HttpFetcher {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        let unreachable = |source| FetchError::Unreachable {
            url: url.to_string(),
            source,
        };
        let write_failed = |source| FetchError::WriteFailed {
            path: destination.to_path_buf(),
            source,
        };

        let mut resp = self.client.get(url).send().await.map_err(unreachable)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = File::create(destination).await.map_err(write_failed)?;
        let mut written = 0u64;

        while let Some(chunk) = resp.chunk().await.map_err(unreachable)? {
            file.write_all(&chunk).await.map_err(write_failed)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_failed)?;

        debug!(url, bytes = written, "download complete");
        Ok(())
    }
}
