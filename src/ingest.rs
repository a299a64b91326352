//! Ingestion pipeline: fingerprint, fetch, detect, parse, materialize.
//!
//! A listing request runs the whole pipeline and returns entry paths in the
//! archive's native order. A content request only derives the fingerprint and
//! reads from the [`ExtractionCache`]; a miss is reported, never fetched.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::archive::{ArchiveFormat, reader_for};
use crate::cache::{ExtractionCache, FingerprintLocks};
use crate::config::{Config, Detection};
use crate::error::IngestError;
use crate::fetch::Fetcher;
use crate::fingerprint::{Fingerprint, fingerprint};

/// Magic numbers we sniff are at most this long
const SNIFF_LEN: usize = 4;

/// Runs ingestions and content lookups against one base directory
#[derive(Clone)]
pub struct Ingestor {
    fetcher: Arc<dyn Fetcher>,
    cache: ExtractionCache,
    /// Serializes runs for one fingerprint, which share a staging file
    runs: FingerprintLocks,
    staging_dir: PathBuf,
    detection: Detection,
}

impl Ingestor {
    pub fn new(config: &Config, fetcher: Arc<dyn Fetcher>) -> Self {
        Ingestor {
            fetcher,
            cache: ExtractionCache::new(config.expand_dir()),
            runs: FingerprintLocks::new(),
            staging_dir: config.staging_dir(),
            detection: config.detection,
        }
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    /// Where the download for a fingerprint is staged
    pub fn staging_path(&self, fp: &Fingerprint) -> PathBuf {
        self.staging_dir.join(fp.as_str())
    }

    /// Download, parse and extract the archive at `url`, returning its entry
    /// paths (directories included) in archive order.
    ///
    /// Concurrent calls for the same URL run one after another; each still
    /// performs its own download.
    pub async fn ingest(&self, url: &str) -> Result<Vec<String>, IngestError> {
        let fp = fingerprint(url);
        let span = info_span!("ingest", fingerprint = %fp);
        self.run(url, &fp).instrument(span).await
    }

    async fn run(&self, url: &str, fp: &Fingerprint) -> Result<Vec<String>, IngestError> {
        let _run = self.runs.write(fp).await;
        fs::create_dir_all(&self.staging_dir).await?;
        let staged = self.staging_path(fp);

        let result = self.ingest_staged(url, fp, &staged).await;

        if let Err(e) = fs::remove_file(&staged).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %staged.display(), error = %e, "failed to remove staging file");
            }
        }

        match &result {
            Ok(paths) => info!(url, entries = paths.len(), "archive ingested"),
            Err(e) => warn!(url, error = %e, "ingestion failed"),
        }
        result
    }

    async fn ingest_staged(
        &self,
        url: &str,
        fp: &Fingerprint,
        staged: &Path,
    ) -> Result<Vec<String>, IngestError> {
        self.fetcher.fetch(url, staged).await?;

        let format = self.resolve_format(url, staged).await;
        debug!(?format, "reading archive");

        let reader = reader_for(format);
        let path = staged.to_path_buf();
        let entries = tokio::task::spawn_blocking(move || reader.read(&path)).await??;

        self.cache.materialize(fp, &entries).await?;

        Ok(entries.into_iter().map(|entry| entry.path).collect())
    }

    /// Pick the archive format for a staged download
    async fn resolve_format(&self, url: &str, staged: &Path) -> ArchiveFormat {
        let by_extension = ArchiveFormat::detect(url);
        let sniffed = match read_header(staged).await {
            Ok(header) => ArchiveFormat::sniff(&header),
            Err(e) => {
                debug!(error = %e, "could not read staged header");
                None
            }
        };

        match (self.detection, sniffed) {
            (Detection::Content, Some(format)) => format,
            (Detection::Content, None) => by_extension,
            (Detection::Extension, Some(format)) if format != by_extension => {
                warn!(
                    url,
                    extension = ?by_extension,
                    content = ?format,
                    "archive content does not match its extension"
                );
                by_extension
            }
            (Detection::Extension, _) => by_extension,
        }
    }

    /// Read one file from a previously ingested archive
    pub async fn content(&self, url: &str, path: &str) -> Result<Bytes, IngestError> {
        let fp = fingerprint(url);
        Ok(self.cache.read_content(&fp, path).await?)
    }
}

async fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = fs::File::open(path).await?;
    let mut header = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut header).await?;
    Ok(header)
}
