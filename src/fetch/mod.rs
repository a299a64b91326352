pub mod http;

use async_trait::async_trait;
use std::path::Path;

use crate::error::FetchError;

pub use http::HttpFetcher;

/// Retrieves the bytes behind a URL into a local file
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` into `destination`, creating or truncating it first.
    ///
    /// On error the destination may be partially written and must be treated
    /// as unusable.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError>;
}
