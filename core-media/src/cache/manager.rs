//! Media cache manager.
//!
//! Owns the asset metadata table and the byte budget. Every mutation of the
//! table happens under one async lock, so admission, eviction and
//! finalization never interleave.

use bridge_traits::{Clock, FileSystemAccess, HttpClient};
use core_runtime::config::{DownloadConfig, MediaCacheConfig};
use core_runtime::events::{CoreEvent, EventBus, MediaEvent};
use core_runtime::logging::strip_path;
use core_sync::{KeyValueStore, SyncError};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::eviction::{plan_eviction, rank_candidates};
use crate::cache::metadata::{AssetFilter, AssetInfo, AssetMetadata, AssetState};
use crate::cache::pins::{PinGuard, PinTable};
use crate::cache::stats::{DownloadProgress, StorageStats};
use crate::download::{
    is_partial_path, CancelPolicy, DownloadController, FetchRequest, FetchResult,
    ProgressCallback, TransferProgress,
};
use crate::error::{MediaError, Result};

/// Key holding the persisted asset table.
pub const ASSETS_KEY: &str = "media.assets";

/// Key holding the storage budget set through [`MediaCache::set_max_bytes`].
pub const MAX_BYTES_KEY: &str = "media.max_bytes";

const FILE_EXTENSION: &str = "media";
const RECOMMENDATION_LIMIT: usize = 5;
const MIN_LANGUAGE_MATCHES: usize = 3;

struct CacheState {
    assets: BTreeMap<String, AssetMetadata>,
    max_bytes: u64,
    /// Advertised sizes of admitted downloads that are not Ready yet
    reserved: HashMap<String, u64>,
}

impl CacheState {
    fn used_bytes(&self) -> u64 {
        self.assets
            .values()
            .filter(|a| a.is_ready())
            .map(|a| a.size_bytes)
            .sum()
    }

    fn available(&self) -> i64 {
        self.max_bytes as i64 - self.used_bytes() as i64
    }

    fn effective_available(&self) -> i64 {
        let reserved: u64 = self.reserved.values().sum();
        self.available() - reserved as i64
    }
}

/// Handle to a download admitted by [`MediaCache::start_download`].
///
/// Cloning is cheap; every clone observes the same transfer.
#[derive(Clone)]
pub struct DownloadHandle {
    asset_id: String,
    progress: watch::Receiver<DownloadProgress>,
    result: Shared<BoxFuture<'static, Result<AssetMetadata>>>,
}

impl DownloadHandle {
    fn completed(meta: AssetMetadata) -> Self {
        let (_, progress) = watch::channel(DownloadProgress::finished(
            meta.id.clone(),
            meta.size_bytes,
        ));
        let asset_id = meta.id.clone();
        let result = futures::future::ready(Ok(meta)).boxed().shared();
        // Resolve eagerly so `is_finished` reports true.
        let _ = result.clone().now_or_never();
        Self {
            asset_id,
            progress,
            result,
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Latest progress snapshot.
    pub fn progress(&self) -> DownloadProgress {
        self.progress.borrow().clone()
    }

    /// Receiver that is notified on every progress change.
    pub fn watch_progress(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.result.peek().is_some()
    }

    /// Wait for the download to reach Ready or fail.
    pub async fn wait(&self) -> Result<AssetMetadata> {
        self.result.clone().await
    }
}

impl fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadHandle")
            .field("asset_id", &self.asset_id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

struct ActiveDownload {
    handle: DownloadHandle,
    token: CancellationToken,
    destination: PathBuf,
}

/// Offline media cache with a byte budget and LRU eviction.
///
/// # Invariants
///
/// - The sum of Ready asset sizes stays within the budget after every
///   admission; only lowering the budget can leave it temporarily over.
/// - A Ready entry always has its bytes on disk. Entries are never persisted
///   before their bytes are complete.
/// - Pinned and in-flight assets are never evicted.
///
/// Without a file system (or with `remote_only` configured) the cache records
/// remote references instead of bytes, and the budget is not consulted.
pub struct MediaCache {
    kv: Arc<KeyValueStore>,
    fs: Option<Arc<dyn FileSystemAccess>>,
    downloads: Option<DownloadController>,
    media_dir: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    config: MediaCacheConfig,
    state: tokio::sync::Mutex<CacheState>,
    pins: Arc<PinTable>,
    active: Mutex<HashMap<String, ActiveDownload>>,
}

impl MediaCache {
    /// Open the cache, restoring persisted metadata.
    ///
    /// Ready entries whose file has disappeared are dropped, and partial files
    /// left by an interrupted run are removed.
    #[instrument(skip_all, fields(remote_only = config.remote_only))]
    pub async fn init(
        kv: Arc<KeyValueStore>,
        fs: Option<Arc<dyn FileSystemAccess>>,
        http: Arc<dyn HttpClient>,
        config: MediaCacheConfig,
        download_config: DownloadConfig,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Result<Arc<Self>> {
        config.validate().map_err(MediaError::InvalidInput)?;
        download_config
            .validate()
            .map_err(MediaError::InvalidInput)?;

        let fs = if config.remote_only { None } else { fs };
        let (media_dir, downloads) = match &fs {
            Some(fs) => {
                let dir = fs.get_data_directory().await?.join(&config.media_directory);
                fs.create_dir_all(&dir).await?;
                let controller = DownloadController::new(http, Arc::clone(fs), download_config);
                (Some(dir), Some(controller))
            }
            None => {
                warn!("No local file storage; media will be recorded as remote references");
                (None, None)
            }
        };

        let max_bytes = match kv.get::<u64>(MAX_BYTES_KEY).await {
            Ok(Some(bytes)) if bytes > 0 => bytes,
            Ok(_) => config.max_bytes,
            Err(SyncError::Serialization(e)) => {
                warn!(error = %e, "Stored media budget is unreadable, using configured value");
                config.max_bytes
            }
            Err(e) => return Err(e.into()),
        };

        let assets = match kv.get::<Vec<AssetMetadata>>(ASSETS_KEY).await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(SyncError::Serialization(e)) => {
                warn!(error = %e, "Stored media metadata is unreadable, starting empty");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        let assets = assets
            .into_iter()
            .filter(|a| a.is_available())
            .map(|a| (a.id.clone(), a))
            .collect();

        let cache = Arc::new(Self {
            kv,
            fs,
            downloads,
            media_dir,
            clock,
            events,
            config,
            state: tokio::sync::Mutex::new(CacheState {
                assets,
                max_bytes,
                reserved: HashMap::new(),
            }),
            pins: PinTable::new(),
            active: Mutex::new(HashMap::new()),
        });

        cache.reconcile().await?;

        let state = cache.state.lock().await;
        info!(
            assets = state.assets.len(),
            used_bytes = state.used_bytes(),
            max_bytes = state.max_bytes,
            "Media cache ready"
        );
        drop(state);

        Ok(cache)
    }

    async fn reconcile(&self) -> Result<()> {
        let (Some(fs), Some(dir)) = (&self.fs, &self.media_dir) else {
            return Ok(());
        };

        let mut state = self.state.lock().await;
        let mut missing = Vec::new();
        for meta in state.assets.values().filter(|a| a.is_ready()) {
            if !fs.exists(Path::new(&meta.local_ref)).await? {
                missing.push(meta.id.clone());
            }
        }
        for id in &missing {
            warn!(asset_id = %id, "Local copy is missing, dropping asset");
            state.assets.remove(id);
        }
        if !missing.is_empty() {
            self.persist_locked(&state).await?;
        }
        drop(state);

        for path in fs.list_directory(dir).await? {
            if is_partial_path(&path) {
                let name = path.to_string_lossy();
                debug!(file = strip_path(&name), "Removing stale partial file");
                if let Err(e) = fs.delete_file(&path).await {
                    warn!(file = strip_path(&name), error = %e, "Failed to remove partial file");
                }
            }
        }
        Ok(())
    }

    pub fn is_remote_only(&self) -> bool {
        self.downloads.is_none()
    }

    fn destination(&self, asset_id: &str) -> Option<PathBuf> {
        self.media_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", asset_id, FILE_EXTENSION)))
    }

    fn emit(&self, event: MediaEvent) {
        let _ = self.events.emit(CoreEvent::Media(event));
    }

    async fn persist_locked(&self, state: &CacheState) -> Result<()> {
        let persisted: Vec<&AssetMetadata> = state
            .assets
            .values()
            .filter(|a| a.state.is_persistent())
            .collect();
        self.kv.set(ASSETS_KEY, &persisted, false).await?;
        Ok(())
    }

    // ========================================================================
    // Downloads
    // ========================================================================

    /// Admit a download and start it in the background.
    ///
    /// Space is reserved up front, evicting least recently watched assets as
    /// needed. Returns [`MediaError::InsufficientStorage`] without touching
    /// anything when the budget cannot fit the asset. A second call for an
    /// asset that is already downloading returns a handle to the same
    /// transfer.
    #[instrument(skip(self, info), fields(asset_id = %info.id, size_bytes = info.size_bytes))]
    pub async fn start_download(self: &Arc<Self>, info: AssetInfo) -> Result<DownloadHandle> {
        info.validate()?;
        let mut state = self.state.lock().await;

        if let Some(active) = self.active.lock().get(&info.id) {
            debug!("Attaching to in-flight download");
            return Ok(active.handle.clone());
        }

        if let Some(existing) = state.assets.get(&info.id) {
            if existing.is_available() {
                debug!(state = %existing.state, "Asset already available");
                return Ok(DownloadHandle::completed(existing.clone()));
            }
        }

        let now = self.clock.now();
        let Some(destination) = self.destination(&info.id) else {
            let meta = AssetMetadata::remote_only(&info, now);
            state.assets.insert(info.id.clone(), meta.clone());
            if let Err(e) = self.persist_locked(&state).await {
                state.assets.remove(&info.id);
                return Err(e);
            }
            info!("Recorded remote-only asset");
            return Ok(DownloadHandle::completed(meta));
        };

        self.ensure_space_locked(&mut state, info.size_bytes).await?;

        state.reserved.insert(info.id.clone(), info.size_bytes);
        state.assets.insert(
            info.id.clone(),
            AssetMetadata::provisional(&info, destination.display().to_string(), now),
        );

        let pin = self.pins.pin(&info.id);
        let token = CancellationToken::new();
        let (progress_tx, progress_rx) =
            watch::channel(DownloadProgress::new(info.id.clone(), info.size_bytes));

        let asset_id = info.id.clone();
        let cache = Arc::clone(self);
        let task_token = token.clone();
        let task_destination = destination.clone();
        let join = tokio::spawn(async move {
            let result = cache
                .run_download(info, task_destination, task_token, progress_tx)
                .await;
            drop(pin);
            result
        });

        let result = async move {
            join.await
                .map_err(|e| MediaError::Internal(format!("download task failed: {}", e)))?
        }
        .boxed()
        .shared();

        let handle = DownloadHandle {
            asset_id: asset_id.clone(),
            progress: progress_rx,
            result,
        };
        self.active.lock().insert(
            asset_id,
            ActiveDownload {
                handle: handle.clone(),
                token,
                destination,
            },
        );
        info!("Download admitted");
        Ok(handle)
    }

    /// Download an asset and wait until it is Ready.
    pub async fn download(self: &Arc<Self>, info: AssetInfo) -> Result<AssetMetadata> {
        self.start_download(info).await?.wait().await
    }

    /// Handle of the running download for `asset_id`, if any.
    pub fn active_download(&self, asset_id: &str) -> Option<DownloadHandle> {
        self.active.lock().get(asset_id).map(|a| a.handle.clone())
    }

    /// Request cancellation of a running download. Returns `false` when
    /// nothing is downloading under that ID.
    pub fn cancel_download(&self, asset_id: &str) -> bool {
        let active = self.active.lock();
        let Some(download) = active.get(asset_id) else {
            return false;
        };
        download.token.cancel();
        if let Some(downloads) = &self.downloads {
            downloads.cancel_path(&download.destination);
        }
        true
    }

    pub async fn download_status(&self, asset_id: &str) -> Option<AssetState> {
        self.state.lock().await.assets.get(asset_id).map(|a| a.state)
    }

    async fn run_download(
        &self,
        info: AssetInfo,
        destination: PathBuf,
        token: CancellationToken,
        progress_tx: watch::Sender<DownloadProgress>,
    ) -> Result<AssetMetadata> {
        {
            let mut state = self.state.lock().await;
            if let Some(meta) = state.assets.get_mut(&info.id) {
                meta.state = AssetState::Downloading;
            }
        }
        self.emit(MediaEvent::DownloadStarted {
            asset_id: info.id.clone(),
            size_bytes: info.size_bytes,
        });

        let progress_tx = Arc::new(progress_tx);
        let outcome = match self
            .transfer_with_retry(&info, &destination, &token, &progress_tx)
            .await
        {
            Ok(fetched) => self.finalize(&info, fetched).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(meta) => {
                progress_tx.send_modify(|p| {
                    p.total_bytes = meta.size_bytes;
                    p.update(meta.size_bytes);
                    p.progress_percent = 100;
                });
                info!(asset_id = %meta.id, size_bytes = meta.size_bytes, "Download complete");
                self.emit(MediaEvent::DownloadCompleted {
                    asset_id: meta.id.clone(),
                    size_bytes: meta.size_bytes,
                });
                Ok(meta)
            }
            Err(e) => {
                self.abandon(&info.id, &destination).await;
                warn!(asset_id = %info.id, error = %e, "Download failed");
                self.emit(MediaEvent::DownloadFailed {
                    asset_id: info.id.clone(),
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                });
                Err(e)
            }
        }
    }

    async fn transfer_with_retry(
        &self,
        info: &AssetInfo,
        destination: &Path,
        token: &CancellationToken,
        progress_tx: &Arc<watch::Sender<DownloadProgress>>,
    ) -> Result<FetchResult> {
        let downloads = self
            .downloads
            .as_ref()
            .ok_or_else(|| MediaError::Internal("no download controller".to_string()))?;
        let callback = self.progress_callback(info, Arc::clone(progress_tx));
        let cancelled = || MediaError::Cancelled(info.id.clone());

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if token.is_cancelled() {
                return Err(cancelled());
            }

            let mut request = FetchRequest::new(&info.url, destination)
                .with_cancel_policy(CancelPolicy::Discard);
            if let Some(checksum) = &info.sha256 {
                request = request.with_sha256(checksum);
            }

            let fetch = downloads.fetch(request, Some(Arc::clone(&callback)));
            tokio::pin!(fetch);
            let result = tokio::select! {
                result = &mut fetch => result,
                _ = token.cancelled() => {
                    downloads.cancel_path(destination);
                    fetch.await
                }
            };

            match result {
                Ok(fetched) if token.is_cancelled() => {
                    if let Some(fs) = &self.fs {
                        let _ = fs.delete_file(&fetched.path).await;
                    }
                    return Err(cancelled());
                }
                Ok(fetched) => return Ok(fetched),
                Err(e) if e.is_retryable() && attempt < self.config.max_retry_attempts => {
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        asset_id = %info.id,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Download attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = token.cancelled() => return Err(cancelled()),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn progress_callback(
        &self,
        info: &AssetInfo,
        progress_tx: Arc<watch::Sender<DownloadProgress>>,
    ) -> ProgressCallback {
        let events = self.events.clone();
        let asset_id = info.id.clone();
        let advertised = info.size_bytes;
        let last_percent = AtomicU8::new(u8::MAX);

        Arc::new(move |transfer: TransferProgress| {
            let total = transfer.total_bytes.unwrap_or(advertised);
            progress_tx.send_modify(|p| {
                p.total_bytes = total;
                p.update(transfer.bytes_downloaded);
            });

            let percent = match transfer.percent() {
                Some(percent) => percent,
                None if total == 0 => 0,
                None => (transfer.bytes_downloaded.min(total) * 100 / total) as u8,
            };
            if last_percent.swap(percent, Ordering::Relaxed) != percent {
                let _ = events.emit(CoreEvent::Media(MediaEvent::DownloadProgress {
                    asset_id: asset_id.clone(),
                    bytes_downloaded: transfer.bytes_downloaded,
                    total_bytes: transfer.total_bytes,
                    percent,
                }));
            }
        })
    }

    async fn finalize(&self, info: &AssetInfo, fetched: FetchResult) -> Result<AssetMetadata> {
        let mut state = self.state.lock().await;
        state.reserved.remove(&info.id);

        if fetched.size_bytes > info.size_bytes {
            debug!(
                asset_id = %info.id,
                advertised = info.size_bytes,
                actual = fetched.size_bytes,
                "Asset is larger than advertised"
            );
            self.ensure_space_locked(&mut state, fetched.size_bytes).await?;
        }

        let now = self.clock.now();
        let meta = match state.assets.get_mut(&info.id) {
            Some(meta) => {
                meta.mark_ready(fetched.size_bytes, now);
                meta.local_ref = fetched.path.display().to_string();
                meta.clone()
            }
            None => return Err(MediaError::Cancelled(info.id.clone())),
        };

        self.persist_locked(&state).await?;
        self.active.lock().remove(&info.id);
        Ok(meta)
    }

    /// Undo everything an admitted download left behind.
    async fn abandon(&self, asset_id: &str, destination: &Path) {
        let mut state = self.state.lock().await;
        state.reserved.remove(asset_id);
        state.assets.remove(asset_id);
        self.active.lock().remove(asset_id);

        if let Some(downloads) = &self.downloads {
            if let Err(e) = downloads.discard_partial(destination).await {
                warn!(asset_id, error = %e, "Failed to remove partial file");
            }
        }
        if let Some(fs) = &self.fs {
            if matches!(fs.exists(destination).await, Ok(true)) {
                if let Err(e) = fs.delete_file(destination).await {
                    warn!(asset_id, error = %e, "Failed to remove downloaded file");
                }
            }
        }
    }

    // ========================================================================
    // Budget
    // ========================================================================

    /// Make room for `required` bytes, evicting if necessary.
    #[instrument(skip(self))]
    pub async fn ensure_space(&self, required: u64) -> Result<()> {
        if self.is_remote_only() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        self.ensure_space_locked(&mut state, required).await
    }

    async fn ensure_space_locked(&self, state: &mut CacheState, required: u64) -> Result<()> {
        let available = state.effective_available();
        if available >= required as i64 {
            return Ok(());
        }

        let shortfall = (required as i64 - available) as u64;
        let ranked = rank_candidates(state.assets.values(), |id| self.pins.is_pinned(id));
        let plan = plan_eviction(&ranked, shortfall);
        if !plan.satisfied {
            warn!(
                required,
                available,
                evictable_bytes = plan.freed_bytes,
                "Not enough evictable space"
            );
            return Err(MediaError::InsufficientStorage {
                required,
                available,
            });
        }

        self.evict_locked(state, &plan.victims).await
    }

    async fn evict_locked(&self, state: &mut CacheState, victims: &[(String, u64)]) -> Result<()> {
        if victims.is_empty() {
            return Ok(());
        }

        for (asset_id, size_bytes) in victims {
            let Some(meta) = state.assets.get(asset_id) else {
                continue;
            };
            // The entry only goes once its file is gone.
            if let Err(e) = self.delete_local(meta).await {
                warn!(asset_id = %asset_id, error = %e, "Failed to delete evicted asset file");
                self.persist_locked(state).await?;
                return Err(e);
            }
            state.assets.remove(asset_id);
            info!(asset_id = %asset_id, size_bytes, "Evicted asset");
            self.emit(MediaEvent::AssetEvicted {
                asset_id: asset_id.clone(),
                size_bytes: *size_bytes,
            });
        }
        self.persist_locked(state).await
    }

    async fn delete_local(&self, meta: &AssetMetadata) -> Result<()> {
        let Some(fs) = &self.fs else {
            return Ok(());
        };
        if !meta.is_ready() {
            return Ok(());
        }
        let path = Path::new(&meta.local_ref);
        if fs.exists(path).await? {
            fs.delete_file(path).await?;
        }
        Ok(())
    }

    /// `max_bytes - used_bytes`. Negative after the budget was lowered below
    /// pinned usage.
    pub async fn available(&self) -> i64 {
        self.state.lock().await.available()
    }

    pub async fn max_bytes(&self) -> u64 {
        self.state.lock().await.max_bytes
    }

    /// Change the storage budget and evict down to it.
    ///
    /// The new value is stored and queued for sync. Pinned assets stay even
    /// if that leaves the cache over budget. Returns the number of evicted
    /// assets.
    #[instrument(skip(self))]
    pub async fn set_max_bytes(&self, bytes: u64) -> Result<usize> {
        if bytes == 0 {
            return Err(MediaError::InvalidInput(
                "Media budget must be greater than 0 bytes".to_string(),
            ));
        }
        self.kv.set(MAX_BYTES_KEY, &bytes, true).await?;

        let mut state = self.state.lock().await;
        state.max_bytes = bytes;

        let over = state.used_bytes().saturating_sub(bytes);
        if over == 0 {
            return Ok(0);
        }
        let ranked = rank_candidates(state.assets.values(), |id| self.pins.is_pinned(id));
        let plan = plan_eviction(&ranked, over);
        if !plan.satisfied {
            warn!(over, "Budget is below pinned usage, evicting what is possible");
        }
        self.evict_locked(&mut state, &plan.victims).await?;
        Ok(plan.victims.len())
    }

    pub async fn stats(&self) -> StorageStats {
        let state = self.state.lock().await;
        let ready = state.assets.values().filter(|a| a.is_ready()).count();
        let remote = state.assets.values().filter(|a| a.is_remote_only()).count();
        StorageStats::new(state.used_bytes(), state.max_bytes, ready, remote)
    }

    // ========================================================================
    // Assets
    // ========================================================================

    /// Remove an asset's bytes and metadata. Deleting an unknown asset is a
    /// no-op; a running download is cancelled first.
    #[instrument(skip(self))]
    pub async fn delete(&self, asset_id: &str) -> Result<()> {
        if let Some(handle) = self.active_download(asset_id) {
            self.cancel_download(asset_id);
            let _ = handle.wait().await;
        }

        let mut state = self.state.lock().await;
        let Some(meta) = state.assets.get(asset_id).cloned() else {
            debug!("Nothing to delete");
            return Ok(());
        };

        self.delete_local(&meta).await?;
        state.assets.remove(asset_id);
        self.persist_locked(&state).await?;

        info!("Deleted asset");
        self.emit(MediaEvent::AssetDeleted {
            asset_id: asset_id.to_string(),
        });
        Ok(())
    }

    /// Record playback progress for an available asset.
    ///
    /// Crossing 90% for the first time marks the asset completed and bumps
    /// its watch count; later updates never un-complete it.
    #[instrument(skip(self))]
    pub async fn update_watch_progress(
        &self,
        asset_id: &str,
        percent: u8,
        position_seconds: f64,
    ) -> Result<AssetMetadata> {
        if percent > 100 {
            return Err(MediaError::InvalidInput(format!(
                "Watch progress must be 0-100, got {}",
                percent
            )));
        }
        if !position_seconds.is_finite() || position_seconds < 0.0 {
            return Err(MediaError::InvalidInput(format!(
                "Invalid playback position: {}",
                position_seconds
            )));
        }

        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(meta) = state
            .assets
            .get_mut(asset_id)
            .filter(|m| m.is_available())
        else {
            return Err(MediaError::NotFound(asset_id.to_string()));
        };

        let previous = meta.clone();
        let crossed = meta.record_watch(percent, position_seconds, now);
        let updated = meta.clone();

        if let Err(e) = self.persist_locked(&state).await {
            state.assets.insert(asset_id.to_string(), previous);
            return Err(e);
        }

        if crossed {
            debug!(watch_count = updated.watch_count, "Asset watched to completion");
            self.emit(MediaEvent::WatchCompleted {
                asset_id: asset_id.to_string(),
            });
        }
        Ok(updated)
    }

    /// Pin an asset so it cannot be evicted while the guard lives.
    pub async fn pin(&self, asset_id: &str) -> Result<PinGuard> {
        let state = self.state.lock().await;
        if !state.assets.contains_key(asset_id) {
            return Err(MediaError::NotFound(asset_id.to_string()));
        }
        Ok(self.pins.pin(asset_id))
    }

    pub fn is_pinned(&self, asset_id: &str) -> bool {
        self.pins.is_pinned(asset_id)
    }

    pub async fn get_asset(&self, asset_id: &str) -> Option<AssetMetadata> {
        self.state
            .lock()
            .await
            .assets
            .get(asset_id)
            .filter(|a| a.is_available())
            .cloned()
    }

    /// Whether the asset's bytes are available offline.
    pub async fn is_downloaded(&self, asset_id: &str) -> bool {
        self.state
            .lock()
            .await
            .assets
            .get(asset_id)
            .is_some_and(|a| a.is_ready())
    }

    pub async fn local_path(&self, asset_id: &str) -> Option<PathBuf> {
        self.state
            .lock()
            .await
            .assets
            .get(asset_id)
            .filter(|a| a.is_ready())
            .map(|a| PathBuf::from(&a.local_ref))
    }

    pub async fn get_downloaded_assets(&self, filter: &AssetFilter) -> Vec<AssetMetadata> {
        let state = self.state.lock().await;
        filter.apply(state.assets.values())
    }

    /// Suggest up to five unwatched assets.
    ///
    /// Unwatched assets in `language` come first; others are added when fewer
    /// than three match. The result is ordered by how often the asset's
    /// category appears among watched assets.
    pub async fn recommendations(&self, language: &str) -> Vec<AssetMetadata> {
        let state = self.state.lock().await;
        let available: Vec<&AssetMetadata> =
            state.assets.values().filter(|a| a.is_available()).collect();

        let mut picks: Vec<&AssetMetadata> = available
            .iter()
            .copied()
            .filter(|a| a.language == language && a.is_unwatched())
            .collect();
        if picks.len() < MIN_LANGUAGE_MATCHES {
            picks.extend(
                available
                    .iter()
                    .copied()
                    .filter(|a| a.language != language && a.is_unwatched()),
            );
        }

        let mut watched_categories: HashMap<&str, usize> = HashMap::new();
        for asset in available.iter().filter(|a| a.watch_count > 0) {
            *watched_categories.entry(asset.category.as_str()).or_insert(0) += 1;
        }
        picks.sort_by_key(|a| {
            Reverse(
                watched_categories
                    .get(a.category.as_str())
                    .copied()
                    .unwrap_or(0),
            )
        });

        picks
            .into_iter()
            .take(RECOMMENDATION_LIMIT)
            .cloned()
            .collect()
    }

    /// Cancel every running download and wait for cleanup.
    pub async fn shutdown(&self) {
        let handles: Vec<DownloadHandle> = {
            let active = self.active.lock();
            for download in active.values() {
                download.token.cancel();
                if let Some(downloads) = &self.downloads {
                    downloads.cancel_path(&download.destination);
                }
            }
            active.values().map(|a| a.handle.clone()).collect()
        };

        if !handles.is_empty() {
            info!(downloads = handles.len(), "Cancelling downloads");
        }
        for handle in handles {
            let _ = handle.wait().await;
        }
    }
}

impl fmt::Debug for MediaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaCache")
            .field("media_dir", &self.media_dir)
            .field("remote_only", &self.is_remote_only())
            .field("active_downloads", &self.active.lock().len())
            .finish()
    }
}
