//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::DynAsyncRead,
    storage::{DynAsyncWrite, FileMetadata, FileSystemAccess},
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const APP_DIR_NAME: &str = "offline-core";

/// Tokio-based file system implementation
///
/// Provides async file I/O operations using:
/// - `tokio::fs` for async operations
/// - The platform data directory from `dirs`
pub struct TokioFileSystem {
    data_dir: PathBuf,
}

impl TokioFileSystem {
    /// Create a new file system accessor with default directories
    pub fn new() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join(APP_DIR_NAME);

        Self { data_dir }
    }

    /// Create a new file system accessor rooted at a custom data directory
    pub fn with_data_directory(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(BridgeError::Io)?;
            }
        }
        Ok(())
    }

    async fn ensure_dir(dir: &Path) -> Result<()> {
        if !fs::try_exists(dir).await.map_err(BridgeError::Io)? {
            fs::create_dir_all(dir).await.map_err(BridgeError::Io)?;
            debug!(path = ?dir, "Created directory");
        }
        Ok(())
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_data_directory(&self) -> Result<PathBuf> {
        Self::ensure_dir(&self.data_dir).await?;
        Ok(self.data_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(BridgeError::Io)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(BridgeError::Io)?;

        Ok(FileMetadata {
            size: metadata.len(),
            created_at: metadata
                .created()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(BridgeError::Io)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(BridgeError::Io)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.ensure_parent(to).await?;
        fs::rename(from, to).await.map_err(BridgeError::Io)?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(BridgeError::Io)?;

        while let Some(entry) = read_dir.next_entry().await.map_err(BridgeError::Io)? {
            entries.push(entry.path());
        }

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    async fn open_read_stream(&self, path: &Path) -> Result<Box<DynAsyncRead>> {
        let file = fs::File::open(path).await.map_err(BridgeError::Io)?;
        debug!(path = ?path, "Opened file for reading");
        Ok(Box::new(file))
    }

    async fn open_write_stream(&self, path: &Path) -> Result<Box<DynAsyncWrite>> {
        self.ensure_parent(path).await?;
        let file = fs::File::create(path).await.map_err(BridgeError::Io)?;
        debug!(path = ?path, "Opened file for writing");
        Ok(Box::new(file))
    }

    async fn open_append_stream(&self, path: &Path) -> Result<Box<DynAsyncWrite>> {
        self.ensure_parent(path).await?;
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(BridgeError::Io)?;
        debug!(path = ?path, "Opened file for appending");
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn scratch_fs() -> (TokioFileSystem, PathBuf) {
        let root = std::env::temp_dir().join(format!("tokio-fs-{}", uuid::Uuid::new_v4()));
        let fs = TokioFileSystem::with_data_directory(root.join("data"));
        (fs, root)
    }

    #[tokio::test]
    async fn test_custom_data_directory() {
        let (fs, root) = scratch_fs();

        let data_dir = fs.get_data_directory().await.unwrap();
        assert_eq!(data_dir, root.join("data"));
        assert!(fs.exists(&data_dir).await.unwrap());

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn test_write_stream_then_read_stream() {
        let (fs, root) = scratch_fs();
        let test_file = root.join("nested").join("test-file.txt");

        {
            let mut writer = fs.open_write_stream(&test_file).await.unwrap();
            writer.write_all(b"Hello, World!").await.unwrap();
            writer.flush().await.unwrap();
        }

        let mut reader = fs.open_read_stream(&test_file).await.unwrap();
        let mut read_data = String::new();
        reader.read_to_string(&mut read_data).await.unwrap();
        assert_eq!(read_data, "Hello, World!");
        assert_eq!(fs.metadata(&test_file).await.unwrap().size, 13);

        fs.delete_file(&test_file).await.unwrap();
        assert!(!fs.exists(&test_file).await.unwrap());

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn test_append_stream_then_rename() {
        let (fs, root) = scratch_fs();
        let part = root.join("media").join("a1.part");
        let dest = root.join("media").join("a1");

        for chunk in [b"abc", b"def"] {
            let mut writer = fs.open_append_stream(&part).await.unwrap();
            writer.write_all(chunk).await.unwrap();
            writer.flush().await.unwrap();
        }

        fs.rename(&part, &dest).await.unwrap();
        assert!(!fs.exists(&part).await.unwrap());
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"abcdef");
        assert_eq!(
            fs.list_directory(&root.join("media")).await.unwrap(),
            vec![dest.clone()]
        );

        let _ = tokio::fs::remove_dir_all(root).await;
    }
}
