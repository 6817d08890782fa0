//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (settings store,
//! HTTP, file system, network signal) into the offline core. Desktop apps
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) so missing bridges are filled with desktop defaults.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::OfflineCore;
//!
//! # async fn example() -> core_service::Result<()> {
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/offline.db")
//!     .sync_endpoint("https://api.example.com/sync")
//!     .build()?;
//!
//! let core = OfflineCore::init(config).await?;
//! core.kv().set("token", "abc", true).await?;
//! core.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_runtime::config::CoreConfig;
pub use core_runtime::events::{CoreEvent, EventBus};
pub use core_runtime::logging::{init_logging, LoggingConfig};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::{
    DesktopNetworkMonitor, ReqwestHttpClient, SqliteSettingsStore, TokioFileSystem,
};

use core_media::MediaCache;
use core_sync::{
    ConnectivityMonitor, DrainReport, HttpReplayClient, KeyValueStore, RemoteReplay, SyncQueue,
    UnconfiguredReplay,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Running offline core: connectivity, key-value store with sync queue, and
/// media cache, all sharing one event bus.
///
/// Create it once with [`OfflineCore::init`] and pass it (or the component
/// handles) to the rest of the app. Call [`OfflineCore::shutdown`] before
/// exit to stop background work.
#[derive(Clone)]
pub struct OfflineCore {
    events: EventBus,
    connectivity: Arc<ConnectivityMonitor>,
    sync_queue: Arc<SyncQueue>,
    kv: Arc<KeyValueStore>,
    media: Arc<MediaCache>,
}

impl OfflineCore {
    /// Start the core.
    ///
    /// Queued writes are replayed to `config.sync.endpoint`. Without an
    /// endpoint they are kept until one is configured.
    pub async fn init(config: CoreConfig) -> Result<Self> {
        let replay: Arc<dyn RemoteReplay> = match &config.sync.endpoint {
            Some(endpoint) => Arc::new(HttpReplayClient::new(
                Arc::clone(&config.http_client),
                endpoint.clone(),
                config.sync.replay_timeout,
            )),
            None => {
                warn!("No sync endpoint configured; queued writes will stay pending");
                Arc::new(UnconfiguredReplay)
            }
        };
        Self::init_with_replay(config, replay).await
    }

    /// Start the core with a custom replay target.
    #[instrument(skip_all)]
    pub async fn init_with_replay(
        config: CoreConfig,
        replay: Arc<dyn RemoteReplay>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_buffer_size);
        let connectivity = ConnectivityMonitor::new(
            config.network_monitor.clone(),
            Some(Arc::clone(&config.http_client)),
            config.connectivity.clone(),
            events.clone(),
        );

        let sync_queue = SyncQueue::new(
            Arc::clone(&config.settings_store),
            replay,
            Arc::clone(&connectivity),
            events.clone(),
            Arc::clone(&config.clock),
            config.sync.coalesce_writes,
        )
        .await?;
        let kv = Arc::new(KeyValueStore::new(
            Arc::clone(&config.settings_store),
            Arc::clone(&sync_queue),
        ));

        let media = MediaCache::init(
            Arc::clone(&kv),
            config.file_system.clone(),
            Arc::clone(&config.http_client),
            config.media.clone(),
            config.download.clone(),
            Arc::clone(&config.clock),
            events.clone(),
        )
        .await?;

        connectivity.start().await;
        if sync_queue.pending_count() > 0 {
            sync_queue.request_drain();
        }

        info!(
            online = connectivity.current_state(),
            pending = sync_queue.pending_count(),
            remote_only_media = media.is_remote_only(),
            "Offline core initialized"
        );

        Ok(Self {
            events,
            connectivity,
            sync_queue,
            kv,
            media,
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn kv(&self) -> &Arc<KeyValueStore> {
        &self.kv
    }

    pub fn sync_queue(&self) -> &Arc<SyncQueue> {
        &self.sync_queue
    }

    pub fn media(&self) -> &Arc<MediaCache> {
        &self.media
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.current_state()
    }

    /// Replay queued writes now instead of waiting for a reconnect.
    pub async fn sync_now(&self) -> Result<DrainReport> {
        Ok(self.sync_queue.sync_now().await?)
    }

    /// Cancel running downloads and stop connectivity monitoring.
    ///
    /// Queued writes stay persisted and are replayed after the next `init`.
    pub async fn shutdown(&self) {
        self.media.shutdown().await;
        self.connectivity.shutdown().await;
        info!(
            pending = self.sync_queue.pending_count(),
            "Offline core stopped"
        );
    }
}
