//! # Core Configuration Module
//!
//! Provides configuration management for the offline core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all host bridges and tuning settings. It enforces
//! fail-fast validation so missing capabilities surface before initialization.
//!
//! ## Required Dependencies
//!
//! - `SettingsStore` - Durable storage primitive for values, the sync queue,
//!   and media metadata
//! - `HttpClient` - Remote replay and media downloads
//!
//! ## Optional Dependencies
//!
//! - `FileSystemAccess` - Local media storage. Without it the media cache runs
//!   in remote-reference mode.
//! - `NetworkMonitor` - Connectivity signal. Without it the core assumes online
//!   and checks reachability periodically.
//! - `Clock` - Time source (defaults to the system clock)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected for anything not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, MediaCacheConfig};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/offline.db")
//!     .sync_endpoint("https://api.example.com/sync")
//!     .media(MediaCacheConfig::default().with_max_bytes(1024 * 1024 * 1024))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! The builder returns actionable errors when capabilities are missing:
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! // Without desktop-shims and without injected bridges this fails with
//! // Error::CapabilityMissing { capability: "SettingsStore", .. }
//! let err = CoreConfig::builder().build().unwrap_err();
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{
    Clock, FileSystemAccess, HttpClient, NetworkMonitor, SettingsStore, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Largest accepted transfer chunk.
const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Core configuration for the offline core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database backing the default `SettingsStore`
    pub database_path: Option<PathBuf>,

    /// Durable key-value primitive (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// HTTP client for replay and downloads (required)
    pub http_client: Arc<dyn HttpClient>,

    /// Local file storage for downloaded media (optional)
    pub file_system: Option<Arc<dyn FileSystemAccess>>,

    /// Platform connectivity signal (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    pub connectivity: ConnectivityConfig,
    pub sync: SyncConfig,
    pub media: MediaCacheConfig,
    pub download: DownloadConfig,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("settings_store", &"SettingsStore { ... }")
            .field("http_client", &"HttpClient { ... }")
            .field(
                "file_system",
                &self
                    .file_system
                    .as_ref()
                    .map(|_| "FileSystemAccess { ... }"),
            )
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field("connectivity", &self.connectivity)
            .field("sync", &self.sync)
            .field("media", &self.media)
            .field("download", &self.download)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

// ============================================================================
// Nested configuration
// ============================================================================

/// Connectivity monitoring settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityConfig {
    /// URL checked with `HEAD` when no platform signal is available
    pub check_url: Option<String>,

    /// Interval between degraded-mode reachability checks (default: 30s)
    pub check_interval: Duration,

    /// Timeout for one reachability request (default: 5s)
    pub check_timeout: Duration,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            check_url: None,
            check_interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectivityConfig {
    pub fn with_check_url(mut self, url: impl Into<String>) -> Self {
        self.check_url = Some(url.into());
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.check_interval.is_zero() {
            return Err("Reachability check interval must be greater than zero".to_string());
        }
        if self.check_timeout.is_zero() {
            return Err("Reachability check timeout must be greater than zero".to_string());
        }
        if let Some(url) = &self.check_url {
            validate_http_url("Reachability check URL", url)?;
        }
        Ok(())
    }
}

/// Sync queue settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Remote endpoint queued operations are POSTed to
    pub endpoint: Option<String>,

    /// Replace an earlier queued write for the same key (default: true)
    pub coalesce_writes: bool,

    /// Timeout for a single replay request (default: 30s)
    pub replay_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            coalesce_writes: true,
            replay_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Enable or disable same-key coalescing.
    pub fn with_coalesce_writes(mut self, enabled: bool) -> Self {
        self.coalesce_writes = enabled;
        self
    }

    pub fn with_replay_timeout(mut self, timeout: Duration) -> Self {
        self.replay_timeout = timeout;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.replay_timeout.is_zero() {
            return Err("Replay timeout must be greater than zero".to_string());
        }
        if let Some(url) = &self.endpoint {
            validate_http_url("Sync endpoint", url)?;
        }
        Ok(())
    }
}

/// Media cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCacheConfig {
    /// Storage budget in bytes (default: 500 MiB)
    pub max_bytes: u64,

    /// Directory for media files, relative to the app data directory
    pub media_directory: String,

    /// Attempts per download before giving up (default: 3)
    pub max_retry_attempts: u32,

    /// Delay before the first retry; doubles per attempt (default: 500ms)
    pub retry_base_delay: Duration,

    /// Record assets as remote references instead of downloading bytes
    pub remote_only: bool,
}

impl Default for MediaCacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 500 * 1024 * 1024,
            media_directory: "offline_media".to_string(),
            max_retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            remote_only: false,
        }
    }
}

impl MediaCacheConfig {
    /// Create a new media cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage budget.
    pub fn with_max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = bytes;
        self
    }

    pub fn with_media_directory(mut self, dir: impl Into<String>) -> Self {
        self.media_directory = dir.into();
        self
    }

    /// Set maximum download attempts.
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Force remote-reference mode even when a file system is available.
    pub fn with_remote_only(mut self, remote_only: bool) -> Self {
        self.remote_only = remote_only;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_bytes == 0 {
            return Err("Media budget must be greater than 0 bytes".to_string());
        }
        if self.media_directory.trim().is_empty() {
            return Err("Media directory cannot be empty".to_string());
        }
        if self.max_retry_attempts == 0 {
            return Err("Max retry attempts must be at least 1".to_string());
        }
        if self.max_retry_attempts > 10 {
            return Err("Max retry attempts cannot exceed 10".to_string());
        }
        Ok(())
    }
}

/// Byte transfer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Read buffer size per chunk (default: 64 KiB)
    pub chunk_size: usize,

    /// Maximum time to wait for one chunk before failing (default: 60s)
    pub stall_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            stall_timeout: Duration::from_secs(60),
        }
    }
}

impl DownloadConfig {
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.chunk_size == 0 {
            return Err("Chunk size must be greater than 0".to_string());
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(format!(
                "Chunk size cannot exceed {} bytes",
                MAX_CHUNK_SIZE
            ));
        }
        if self.stall_timeout.is_zero() {
            return Err("Stall timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn validate_http_url(what: &str, url: &str) -> std::result::Result<(), String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(format!("{} must be an http(s) URL, got '{}'", what, url))
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.connectivity.validate().map_err(Error::Config)?;
        self.sync.validate().map_err(Error::Config)?;
        self.media.validate().map_err(Error::Config)?;
        self.download.validate().map_err(Error::Config)?;

        Ok(())
    }

    /// Whether media will be stored as remote references only.
    pub fn media_remote_only(&self) -> bool {
        self.media.remote_only || self.file_system.is_none()
    }
}

// ============================================================================
// Desktop defaults
// ============================================================================

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required to persist values, the sync queue \
                 and media metadata. \
                 Desktop: enable the 'desktop-shims' feature and set .database_path() to use \
                 the default SqliteSettingsStore. \
                 Mobile: inject platform-native storage (UserDefaults/DataStore)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for sync replay and media downloads. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile: inject a client backed by URLSession/OkHttp."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(
    database_path: Option<&PathBuf>,
) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let path = database_path.cloned().ok_or_else(|| {
        Error::Config(
            "Database path is required when no SettingsStore is injected. \
             Use .database_path() to set it."
                .to_string(),
        )
    })?;

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!(
                "Failed to create Tokio runtime for default settings store: {}",
                e
            ))
        })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
            })
    };

    // A runtime can't be blocked on from inside another one
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(
    _database_path: Option<&PathBuf>,
) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client: Arc<dyn HttpClient> = Arc::new(bridge_desktop::ReqwestHttpClient::new());
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Option<Arc<dyn FileSystemAccess>> {
    Some(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Option<Arc<dyn FileSystemAccess>> {
    None
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    Some(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    None
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for constructing [`CoreConfig`] instances.
///
/// Set options incrementally, then call [`build()`](CoreConfigBuilder::build).
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    connectivity: ConnectivityConfig,
    sync: SyncConfig,
    media: MediaCacheConfig,
    download: DownloadConfig,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the database path used by the default `SettingsStore`.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/offline.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Injects the durable storage primitive.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Injects local file storage for downloaded media.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the remote endpoint queued writes are replayed to.
    pub fn sync_endpoint(mut self, url: impl Into<String>) -> Self {
        self.sync.endpoint = Some(url.into());
        self
    }

    pub fn connectivity(mut self, config: ConnectivityConfig) -> Self {
        self.connectivity = config;
        self
    }

    pub fn sync(mut self, config: SyncConfig) -> Self {
        self.sync = config;
        self
    }

    pub fn media(mut self, config: MediaCacheConfig) -> Self {
        self.media = config;
        self
    }

    pub fn download(mut self, config: DownloadConfig) -> Self {
        self.download = config;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if:
    /// - Required bridges are missing (SettingsStore, HttpClient)
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(self.database_path.as_ref())?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = if self.media.remote_only {
            None
        } else {
            self.file_system.or_else(provide_default_file_system)
        };

        let network_monitor = self
            .network_monitor
            .or_else(provide_default_network_monitor);

        let config = CoreConfig {
            database_path: self.database_path,
            settings_store,
            http_client,
            file_system,
            network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            connectivity: self.connectivity,
            sync: self.sync,
            media: self.media,
            download: self.download,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{DynAsyncRead, HttpRequest, HttpResponse};

    struct NullSettingsStore;

    #[async_trait]
    impl SettingsStore for NullSettingsStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn clear_all(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NullHttpClient;

    #[async_trait]
    impl HttpClient for NullHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(bridge_traits::BridgeError::NotAvailable("offline".to_string()))
        }

        async fn download_stream(&self, _url: String) -> BridgeResult<Box<DynAsyncRead>> {
            Err(bridge_traits::BridgeError::NotAvailable("offline".to_string()))
        }
    }

    fn injected() -> CoreConfigBuilder {
        CoreConfig::builder()
            .settings_store(Arc::new(NullSettingsStore))
            .http_client(Arc::new(NullHttpClient))
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_settings_store() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(NullHttpClient))
            .build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("SettingsStore"));
        assert!(err_msg.contains("sync queue"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client() {
        let result = CoreConfig::builder()
            .settings_store(Arc::new(NullSettingsStore))
            .build();

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            Error::CapabilityMissing { ref capability, .. } if capability == "HttpClient"
        ));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_optional_bridges_default_to_degraded_modes() {
        let config = injected().build().unwrap();

        assert!(config.file_system.is_none());
        assert!(config.network_monitor.is_none());
        assert!(config.media_remote_only());
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_default_settings_store_requires_database_path() {
        let result = CoreConfig::builder().build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database path is required"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let base = std::env::temp_dir().join(format!("core-runtime-test-{}", uuid::Uuid::new_v4()));
        let db_path = base.join("offline.db");

        let config = CoreConfig::builder()
            .database_path(&db_path)
            .build()
            .expect("desktop defaults should succeed");

        assert!(config.file_system.is_some());
        assert!(config.network_monitor.is_some());

        let settings = config.settings_store.clone();
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            settings.set_string("theme", "dark").await.unwrap();
            let value = settings.get_string("theme").await.unwrap();
            assert_eq!(value.as_deref(), Some("dark"));
        });

        drop(config);
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_builder_defaults() {
        let config = injected().build().unwrap();

        assert_eq!(config.media.max_bytes, 500 * 1024 * 1024);
        assert_eq!(config.media.media_directory, "offline_media");
        assert!(config.sync.coalesce_writes);
        assert_eq!(config.connectivity.check_interval, Duration::from_secs(30));
        assert_eq!(config.download.chunk_size, 64 * 1024);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn test_remote_only_drops_file_system() {
        let config = injected()
            .media(MediaCacheConfig::default().with_remote_only(true))
            .build()
            .unwrap();

        assert!(config.file_system.is_none());
        assert!(config.media_remote_only());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let result = injected()
            .media(MediaCacheConfig::default().with_max_bytes(0))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must be greater than 0 bytes"));
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let result = injected().sync_endpoint("ftp://example.com/sync").build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("Sync endpoint"));
        assert!(err_msg.contains("ftp://example.com/sync"));
    }

    #[test]
    fn test_validate_rejects_oversized_chunks() {
        let result = injected()
            .download(DownloadConfig::default().with_chunk_size(MAX_CHUNK_SIZE + 1))
            .build();

        assert!(result.unwrap_err().to_string().contains("Chunk size"));
    }

    #[test]
    fn test_nested_validation() {
        assert!(ConnectivityConfig::default()
            .with_check_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ConnectivityConfig::default()
            .with_check_url("https://example.com/health")
            .validate()
            .is_ok());
        assert!(MediaCacheConfig::default()
            .with_max_retry_attempts(11)
            .validate()
            .is_err());
        assert!(SyncConfig::default()
            .with_replay_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = injected()
            .database_path("/db/offline.db")
            .event_buffer_size(16)
            .build()
            .unwrap();

        let cloned = config.clone();
        assert_eq!(cloned.database_path, config.database_path);
        assert_eq!(cloned.event_buffer_size, 16);
        assert!(format!("{:?}", cloned).contains("SettingsStore { ... }"));
    }
}
