//! I/O managers for reading and atomically writing files

use crate::error::{CodecError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Trait for I/O operations on a storage backend
#[async_trait]
pub trait IOManager: Send + Sync {
    /// Read data from a path
    async fn read(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a path. Readers never observe a partially written file.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// List file names in a directory
    async fn list(&self, dir: &Path) -> Result<Vec<String>>;

    /// Get the size of data at a path
    async fn size(&self, path: &Path) -> Result<u64>;
}

/// File system I/O manager
#[derive(Debug, Clone, Default)]
pub struct FileSystemIOManager;

impl FileSystemIOManager {
    pub fn new() -> Self {
        Self
    }
}

/// Hidden sibling path used while `path` is being written
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

async fn write_and_sync(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

#[async_trait]
impl IOManager for FileSystemIOManager {
    async fn read(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(CodecError::Io)?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(CodecError::Io)?;
        }

        let temp = temp_path_for(path);
        let written = match write_and_sync(&temp, data).await {
            Ok(()) => fs::rename(&temp, path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("could not remove temporary file {}: {}", temp.display(), cleanup);
                }
            }
            return Err(CodecError::Io(e));
        }

        debug!("wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    async fn list(&self, dir: &Path) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(dir).await.map_err(CodecError::Io)?;

        while let Some(entry) = read_dir.next_entry().await.map_err(CodecError::Io)? {
            if !entry.file_type().await.map_err(CodecError::Io)?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                entries.push(name.to_string());
            }
        }

        entries.sort();
        Ok(entries)
    }

    async fn size(&self, path: &Path) -> Result<u64> {
        let metadata = fs::metadata(path).await.map_err(CodecError::Io)?;
        Ok(metadata.len())
    }
}
