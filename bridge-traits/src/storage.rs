//! Storage and File System Abstractions
//!
//! Provides platform-agnostic traits for file I/O and the durable key-value
//! primitive the core persists its state through.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::http::DynAsyncRead;

/// Dynamic async writer handed out for streamed file writes.
pub type DynAsyncWrite = dyn tokio::io::AsyncWrite + Send + Unpin;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts file I/O operations to support different platforms:
/// - Desktop: Direct filesystem access
/// - iOS/Android: Sandboxed app directories
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn media_dir(fs: &dyn FileSystemAccess) -> Result<PathBuf> {
///     let dir = fs.get_data_directory().await?.join("offline_media");
///     fs.create_dir_all(&dir).await?;
///     Ok(dir)
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's data directory
    ///
    /// This directory is suitable for persistent application data.
    async fn get_data_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Rename a file, replacing the destination if it exists
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Open a file for streaming reads
    async fn open_read_stream(&self, path: &Path) -> Result<Box<DynAsyncRead>>;

    /// Open a file for streaming writes, truncating existing content
    async fn open_write_stream(&self, path: &Path) -> Result<Box<DynAsyncWrite>>;

    /// Open a file for streaming appends, creating it if missing
    async fn open_append_stream(&self, path: &Path) -> Result<Box<DynAsyncWrite>>;
}

/// Durable key-value storage primitive
///
/// Holds one opaque serialized string per key. The core layers its key-value
/// store, sync queue, and media metadata on top of this trait.
///
/// - iOS: UserDefaults / file-backed store
/// - Android: SharedPreferences / DataStore
/// - Desktop: SQLite (`bridge-desktop::SqliteSettingsStore`)
///
/// A completed `set_string` must be durable and fully visible to subsequent
/// reads; a failed one must leave the previous value intact.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("profile", r#"{"name":"Ana"}"#).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value, replacing any previous value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a value; deleting a missing key succeeds
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all values
    async fn clear_all(&self) -> Result<()>;
}
