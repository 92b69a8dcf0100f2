//! Publishing exported certificates.
//!
//! The upload service is an outside collaborator; the engine only needs
//! "bytes in, content address out". `LocalContentStore` is the on-disk
//! stand-in used by the CLI.

use log::{debug, info};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::hashing::sha256_hex;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to publish an empty image")]
    Empty,
}

/// Accepts encoded certificate bytes and returns their content address.
pub trait CertificateSink {
    fn publish(&mut self, png: &[u8]) -> Result<String, PublishError>;
}

/// Stores each image as `<sha256>.png` in a directory.
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    dir: PathBuf,
}

impl LocalContentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, address: &str) -> PathBuf {
        self.dir.join(format!("{}.png", address))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CertificateSink for LocalContentStore {
    fn publish(&mut self, png: &[u8]) -> Result<String, PublishError> {
        if png.is_empty() {
            return Err(PublishError::Empty);
        }
        let address = sha256_hex(png);
        let path = self.path_for(&address);
        if path.exists() {
            debug!("Content {} already published", address);
            return Ok(address);
        }

        std::fs::create_dir_all(&self.dir).map_err(|source| PublishError::Io {
            path: self.dir.clone(),
            source,
        })?;
        std::fs::write(&path, png).map_err(|source| PublishError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Published {} ({} bytes)", address, png.len());
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_addressed_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalContentStore::new(dir.path().join("out"));
        let a = store.publish(b"png bytes").unwrap();
        let b = store.publish(b"png bytes").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, sha256_hex(b"png bytes"));
        assert_eq!(std::fs::read(store.path_for(&a)).unwrap(), b"png bytes");
    }

    #[test]
    fn test_empty_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalContentStore::new(dir.path());
        assert!(matches!(store.publish(&[]), Err(PublishError::Empty)));
    }
}
