//! File-read handler
//!
//! Serves plain files from a single root directory, memoized through a
//! bounded cache. Names are flat: anything that could address a different
//! directory is rejected before touching the filesystem.

use crate::cache::{BoundedCache, CacheStats};
use crate::clock::{Clock, ProductionClock};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct FileReader<C: Clock = ProductionClock> {
    root: PathBuf,
    cache: BoundedCache<String, Bytes, C>,
}

impl<C: Clock> FileReader<C> {
    pub fn new(root: impl Into<PathBuf>, cache: BoundedCache<String, Bytes, C>) -> Self {
        FileReader {
            root: root.into(),
            cache,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Contents of `{root}/{filename}`
    pub async fn read(&self, filename: &str) -> Result<Bytes, FileError> {
        validate_name(filename)?;

        if let Some(cached) = self.cache.get(&filename.to_string()) {
            return Ok(cached);
        }

        let path = self.root.join(filename);
        let data = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                FileError::NotFound(filename.to_string())
            } else {
                FileError::Io {
                    name: filename.to_string(),
                    source: e,
                }
            }
        })?;

        debug!("Read {} bytes from {}", data.len(), path.display());
        let data = Bytes::from(data);
        self.cache.insert(filename.to_string(), data.clone());
        Ok(data)
    }

    /// Forget a memoized file so the next read hits the disk
    pub fn invalidate(&self, filename: &str) -> bool {
        self.cache.invalidate(&filename.to_string())
    }
}

fn validate_name(filename: &str) -> Result<(), FileError> {
    let bad = filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains('\0')
        || filename.contains("..");
    if bad {
        Err(FileError::InvalidName(filename.to_string()))
    } else {
        Ok(())
    }
}
