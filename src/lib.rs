//! Inspect remote ZIP and tar.gz archives without unpacking them yourself.
//!
//! An archive URL is downloaded once, its entries extracted into a directory
//! named by the SHA-1 fingerprint of the URL, and individual files are then
//! served from that directory.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zipinfo::config::Config;
//! use zipinfo::fetch::HttpFetcher;
//! use zipinfo::ingest::Ingestor;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load(None)?;
//! let ingestor = Ingestor::new(&config, Arc::new(HttpFetcher::new(&config.fetch)?));
//!
//! let url = "https://example.com/project.tar.gz";
//! for path in ingestor.ingest(url).await? {
//!     println!("{path}");
//! }
//! let readme = ingestor.content(url, "project/README.md").await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod ingest;
pub mod server;

pub use error::{CacheError, FetchError, IngestError, ParseError};
