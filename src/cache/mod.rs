pub mod lock;

use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::archive::ArchiveEntry;
use crate::error::CacheError;
use crate::fingerprint::Fingerprint;

pub use lock::FingerprintLocks;

/// On-disk cache of extracted archives, one directory per fingerprint.
///
/// Directories are never removed; re-extracting a fingerprint overwrites its
/// files in place.
#[derive(Clone)]
pub struct ExtractionCache {
    root: PathBuf,
    locks: FingerprintLocks,
}

impl ExtractionCache {
    /// Create a cache rooted at `root` (the `expand` directory)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ExtractionCache {
            root: root.into(),
            locks: FingerprintLocks::new(),
        }
    }

    /// Directory holding the extracted tree for a fingerprint
    pub fn dir_for(&self, fp: &Fingerprint) -> PathBuf {
        self.root.join(fp.as_str())
    }

    /// Whether a fingerprint has ever been extracted
    pub async fn contains(&self, fp: &Fingerprint) -> bool {
        fs::metadata(self.dir_for(fp))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Write entries under the fingerprint's directory, in order.
    ///
    /// Stops at the first entry that cannot be written. Entries written before
    /// the failure are left in place.
    pub async fn materialize(
        &self,
        fp: &Fingerprint,
        entries: &[ArchiveEntry],
    ) -> Result<(), CacheError> {
        let _guard = self.locks.write(fp).await;

        let dir = self.dir_for(fp);
        create_dir_all(&dir).await?;

        for entry in entries {
            let target = resolve_entry_path(&dir, &entry.path)?;

            if entry.is_dir {
                create_dir_all(&target).await?;
                continue;
            }

            if target == dir {
                return Err(CacheError::UnsafePath(entry.path.clone()));
            }
            if let Some(parent) = target.parent() {
                create_dir_all(parent).await?;
            }
            fs::write(&target, &entry.content)
                .await
                .map_err(|source| CacheError::WriteFailed {
                    path: target.clone(),
                    source,
                })?;
        }

        debug!(fingerprint = %fp, entries = entries.len(), "archive materialized");
        Ok(())
    }

    /// Read one extracted file.
    ///
    /// `relative_path` is joined onto the fingerprint's directory as-is;
    /// callers must sanitize it first.
    pub async fn read_content(
        &self,
        fp: &Fingerprint,
        relative_path: &str,
    ) -> Result<Bytes, CacheError> {
        let _guard = self.locks.read(fp).await;

        let path = self.dir_for(fp).join(relative_path);
        let read_failed = |source| CacheError::ReadFailed {
            path: path.clone(),
            source,
        };

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Err(CacheError::NotFound(relative_path.to_string())),
            Ok(_) => Ok(Bytes::from(fs::read(&path).await.map_err(read_failed)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CacheError::NotFound(relative_path.to_string()))
            }
            Err(e) => Err(read_failed(e)),
        }
    }
}

async fn create_dir_all(path: &Path) -> Result<(), CacheError> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| CacheError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

/// Map an archive entry path onto the cache directory, refusing anything
/// that would land outside it.
fn resolve_entry_path(dir: &Path, entry_path: &str) -> Result<PathBuf, CacheError> {
    let mut target = dir.to_path_buf();
    for component in Path::new(entry_path).components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(CacheError::UnsafePath(entry_path.to_string()));
            }
        }
    }
    Ok(target)
}
