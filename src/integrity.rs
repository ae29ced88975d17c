//! Content integrity digests
//!
//! The header records an opaque digest per entry so a reader can verify
//! file contents without trusting the archive bytes. Providers are
//! pluggable; the shipped implementation hashes with BLAKE3.

use crate::error::HeaderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Digest value carried on header nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
    pub algorithm: String,
    pub hash: String,
}

/// Produces a content digest for a source path
#[async_trait]
pub trait IntegrityProvider: Send + Sync {
    async fn digest(&self, path: &Path) -> Result<Integrity, HeaderError>;
}

/// Default provider: BLAKE3 over the full file content, hex-encoded
#[derive(Debug, Default)]
pub struct Blake3Provider;

#[async_trait]
impl IntegrityProvider for Blake3Provider {
    async fn digest(&self, path: &Path) -> Result<Integrity, HeaderError> {
        let content = tokio::fs::read(path).await.map_err(|e| HeaderError::Integrity {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        let hash = blake3::hash(&content);
        Ok(Integrity {
            algorithm: "BLAKE3".to_string(),
            hash: hex::encode(hash.as_bytes()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_digest_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "content").unwrap();

        let provider = Blake3Provider;
        let first = provider.digest(&file).await.unwrap();
        let second = provider.digest(&file).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.algorithm, "BLAKE3");
        assert_eq!(first.hash.len(), 64);
    }

    #[tokio::test]
    async fn test_digest_tracks_content() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");

        fs::write(&file, "one").unwrap();
        let provider = Blake3Provider;
        let first = provider.digest(&file).await.unwrap();

        fs::write(&file, "two").unwrap();
        let second = provider.digest(&file).await.unwrap();

        assert_ne!(first.hash, second.hash);
    }

    #[tokio::test]
    async fn test_digest_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Blake3Provider;
        let result = provider.digest(&temp_dir.path().join("missing")).await;
        assert!(matches!(result, Err(HeaderError::Integrity { .. })));
    }
}
