//! services/api/src/adapters/credentials.rs
//!
//! The filesystem implementation of the `CredentialStore` port. The messaging
//! client persists its pairing credentials in a directory; this adapter only
//! checks for that directory and wipes it.

use async_trait::async_trait;
use chat_export_core::{CredentialStore, PortError, PortResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct FsCredentialStore {
    path: PathBuf,
}

impl FsCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FsCredentialStore {
    async fn exists(&self) -> PortResult<bool> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| PortError::Unexpected(format!("{}: {}", self.path.display(), e)))
    }

    async fn wipe(&self) -> PortResult<()> {
        let result = match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&self.path).await,
            Ok(_) => tokio::fs::remove_file(&self.path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                info!("Removed stored credentials at {}.", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unexpected(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
