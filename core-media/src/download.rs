//! # Download Controller
//!
//! Resumable byte transfers from a remote source into local storage.
//!
//! ## Overview
//!
//! Bytes stream into `<destination>.part`. Once the transfer is complete and
//! verified, the partial file is renamed over the destination, so the
//! destination path only ever holds complete content.
//!
//! A transfer that is interrupted leaves the partial file in place. The next
//! fetch for the same destination resumes from its length with a
//! `Range: bytes=<offset>-` request:
//! - `206` appends to the partial file
//! - `200` means the server ignored the range; the partial is truncated
//! - `416` finalizes the partial if it already matches the total size, and
//!   restarts from zero otherwise
//!
//! Only one transfer runs per destination. Concurrent fetches of the same
//! destination attach to the running transfer and share its result.

use bridge_traits::error::BridgeError;
use bridge_traits::http::{DynAsyncRead, HttpClient};
use bridge_traits::storage::FileSystemAccess;
use core_runtime::config::DownloadConfig;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{MediaError, Result};

const PARTIAL_SUFFIX: &str = ".part";

/// Path of the partial file backing `destination`.
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

pub fn is_partial_path(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == &PARTIAL_SUFFIX[1..])
}

/// Identifier of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(Uuid);

impl TransferId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happens to the partial file when a transfer is cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelPolicy {
    /// Leave the partial for a later resume
    #[default]
    KeepPartial,
    /// Remove the partial
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Exact size the content must have
    pub expected_size: Option<u64>,
    /// Lowercase hex SHA-256 the content must hash to
    pub sha256: Option<String>,
    pub cancel_policy: CancelPolicy,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            expected_size: None,
            sha256: None,
            cancel_policy: CancelPolicy::default(),
        }
    }

    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    pub fn with_sha256(mut self, checksum: impl Into<String>) -> Self {
        self.sha256 = Some(checksum.into());
        self
    }

    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Bytes confirmed on disk so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
}

impl TransferProgress {
    pub fn percent(&self) -> Option<u8> {
        match self.total_bytes {
            Some(0) => Some(100),
            Some(total) => Some(((self.bytes_downloaded.min(total) * 100) / total) as u8),
            None => None,
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

type SharedTransfer = Shared<BoxFuture<'static, Result<FetchResult>>>;

struct InFlight {
    id: TransferId,
    token: CancellationToken,
    listeners: Arc<Mutex<Vec<ProgressCallback>>>,
    result: SharedTransfer,
}

struct ControllerInner {
    http: Arc<dyn HttpClient>,
    fs: Arc<dyn FileSystemAccess>,
    config: DownloadConfig,
    active: Mutex<HashMap<PathBuf, InFlight>>,
}

/// Runs resumable transfers. Cheap to clone.
#[derive(Clone)]
pub struct DownloadController {
    inner: Arc<ControllerInner>,
}

enum Opened {
    Stream {
        body: Box<DynAsyncRead>,
        offset: u64,
        total: Option<u64>,
    },
    AlreadyComplete(u64),
}

impl DownloadController {
    pub fn new(
        http: Arc<dyn HttpClient>,
        fs: Arc<dyn FileSystemAccess>,
        config: DownloadConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                http,
                fs,
                config,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Transfer `request.url` into `request.destination`.
    ///
    /// Attaches to the running transfer when one exists for the destination;
    /// `on_progress` then joins its listeners. The transfer runs on its own
    /// task, so dropping the returned future does not stop it.
    pub async fn fetch(
        &self,
        request: FetchRequest,
        on_progress: Option<ProgressCallback>,
    ) -> Result<FetchResult> {
        let result = {
            let mut active = self.inner.active.lock();
            match active.get(&request.destination) {
                Some(existing) => {
                    debug!(transfer_id = %existing.id, "Attaching to in-flight transfer");
                    if let Some(callback) = on_progress {
                        existing.listeners.lock().push(callback);
                    }
                    existing.result.clone()
                }
                None => {
                    let id = TransferId::new();
                    let token = CancellationToken::new();
                    let listeners = Arc::new(Mutex::new(on_progress.into_iter().collect()));
                    let destination = request.destination.clone();

                    let inner = Arc::clone(&self.inner);
                    let task_token = token.clone();
                    let task_listeners = Arc::clone(&listeners);
                    let handle = tokio::spawn(async move {
                        let destination = request.destination.clone();
                        let result = inner.run(request, task_token, task_listeners).await;
                        let mut active = inner.active.lock();
                        if active.get(&destination).map(|t| t.id) == Some(id) {
                            active.remove(&destination);
                        }
                        result
                    });

                    let result: SharedTransfer = async move {
                        handle
                            .await
                            .map_err(|e| MediaError::Internal(format!("transfer task failed: {}", e)))?
                    }
                    .boxed()
                    .shared();

                    active.insert(
                        destination,
                        InFlight {
                            id,
                            token,
                            listeners,
                            result: result.clone(),
                        },
                    );
                    result
                }
            }
        };

        result.await
    }

    pub fn transfer_id(&self, destination: &Path) -> Option<TransferId> {
        self.inner.active.lock().get(destination).map(|t| t.id)
    }

    /// Request cancellation of a running transfer. Returns `false` when no
    /// transfer has that ID.
    pub fn cancel(&self, transfer_id: &TransferId) -> bool {
        let active = self.inner.active.lock();
        match active.values().find(|t| t.id == *transfer_id) {
            Some(transfer) => {
                transfer.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_path(&self, destination: &Path) -> bool {
        match self.inner.active.lock().get(destination) {
            Some(transfer) => {
                transfer.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, destination: &Path) -> bool {
        self.inner.active.lock().contains_key(destination)
    }

    /// Remove leftover partial bytes for `destination`.
    pub async fn discard_partial(&self, destination: &Path) -> Result<()> {
        self.inner.discard_partial(destination).await
    }

    /// Bytes already stored in the partial file for `destination`.
    pub async fn partial_len(&self, destination: &Path) -> Result<u64> {
        self.inner.partial_len(&partial_path(destination)).await
    }
}

impl fmt::Debug for DownloadController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadController")
            .field("active", &self.inner.active.lock().len())
            .finish()
    }
}

impl ControllerInner {
    #[instrument(skip(self, token, listeners), fields(url = %request.url))]
    async fn run(
        &self,
        request: FetchRequest,
        token: CancellationToken,
        listeners: Arc<Mutex<Vec<ProgressCallback>>>,
    ) -> Result<FetchResult> {
        let part = partial_path(&request.destination);

        let (written, total) = match self.open(&request, &part).await? {
            Opened::AlreadyComplete(size) => (size, Some(size)),
            Opened::Stream {
                body,
                offset,
                total,
            } => {
                let written = self
                    .stream_to_partial(&request, &part, body, offset, total, &token, &listeners)
                    .await?;
                (written, total)
            }
        };

        if let Err(e) = self.verify(&request, &part, written, total).await {
            warn!(error = %e, "Transfer failed verification, discarding partial");
            self.remove_if_exists(&part).await?;
            return Err(e);
        }

        self.fs.rename(&part, &request.destination).await?;
        info!(
            destination = ?request.destination,
            size_bytes = written,
            "Transfer complete"
        );

        Ok(FetchResult {
            path: request.destination,
            size_bytes: written,
        })
    }

    async fn open(&self, request: &FetchRequest, part: &Path) -> Result<Opened> {
        let offset = self.partial_len(part).await?;

        let response = match self.http.download_range(request.url.clone(), offset).await {
            Ok(response) => response,
            Err(BridgeError::NotAvailable(reason)) if offset > 0 => {
                debug!(%reason, "Range requests unavailable, restarting transfer");
                return self.restart(request, part).await;
            }
            Err(e) => return Err(MediaError::network(e)),
        };

        if response.is_partial() {
            debug!(offset, "Resuming transfer");
            return Ok(Opened::Stream {
                body: response.body,
                offset,
                total: response.total_size,
            });
        }

        if response.is_unsatisfiable() {
            let total = response.total_size.or(request.expected_size);
            if offset > 0 && total == Some(offset) {
                return Ok(Opened::AlreadyComplete(offset));
            }
            warn!(offset, ?total, "Partial file does not match remote, restarting transfer");
            return self.restart(request, part).await;
        }

        if response.status == 200 {
            if offset > 0 {
                debug!(offset, "Server ignored range request, restarting from zero");
                self.remove_if_exists(part).await?;
            }
            return Ok(Opened::Stream {
                body: response.body,
                offset: 0,
                total: response.total_size,
            });
        }

        Err(MediaError::Network(format!(
            "unexpected HTTP status {} for {}",
            response.status, request.url
        )))
    }

    async fn restart(&self, request: &FetchRequest, part: &Path) -> Result<Opened> {
        self.remove_if_exists(part).await?;
        let response = self
            .http
            .download_range(request.url.clone(), 0)
            .await
            .map_err(MediaError::network)?;
        if !(200..300).contains(&response.status) {
            return Err(MediaError::Network(format!(
                "unexpected HTTP status {} for {}",
                response.status, request.url
            )));
        }
        Ok(Opened::Stream {
            body: response.body,
            offset: 0,
            total: response.total_size,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_to_partial(
        &self,
        request: &FetchRequest,
        part: &Path,
        mut body: Box<DynAsyncRead>,
        offset: u64,
        total: Option<u64>,
        token: &CancellationToken,
        listeners: &Mutex<Vec<ProgressCallback>>,
    ) -> Result<u64> {
        let mut writer = if offset > 0 {
            self.fs.open_append_stream(part).await?
        } else {
            self.fs.open_write_stream(part).await?
        };

        let mut buffer = vec![0u8; self.config.chunk_size];
        let mut written = offset;
        notify(listeners, written, total);

        loop {
            let read = tokio::select! {
                _ = token.cancelled() => None,
                read = tokio::time::timeout(self.config.stall_timeout, body.read(&mut buffer)) => Some(read),
            };

            let Some(read) = read else {
                drop(writer);
                return Err(self.cancelled(request, part, written).await);
            };

            let n = match read {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    let _ = writer.flush().await;
                    return Err(MediaError::Network(format!("read failed: {}", e)));
                }
                Err(_) => {
                    let _ = writer.flush().await;
                    return Err(MediaError::Network(format!(
                        "no data received for {:?}",
                        self.config.stall_timeout
                    )));
                }
            };
            if n == 0 {
                break;
            }

            writer
                .write_all(&buffer[..n])
                .await
                .map_err(|e| MediaError::Persistence(format!("write failed: {}", e)))?;
            writer
                .flush()
                .await
                .map_err(|e| MediaError::Persistence(format!("flush failed: {}", e)))?;
            written += n as u64;
            notify(listeners, written, total);

            if token.is_cancelled() {
                drop(writer);
                return Err(self.cancelled(request, part, written).await);
            }
        }

        writer
            .shutdown()
            .await
            .map_err(|e| MediaError::Persistence(format!("close failed: {}", e)))?;
        Ok(written)
    }

    async fn cancelled(&self, request: &FetchRequest, part: &Path, written: u64) -> MediaError {
        info!(written, policy = ?request.cancel_policy, "Transfer cancelled");
        if request.cancel_policy == CancelPolicy::Discard {
            if let Err(e) = self.remove_if_exists(part).await {
                return e;
            }
        }
        MediaError::Cancelled(request.destination.display().to_string())
    }

    async fn verify(
        &self,
        request: &FetchRequest,
        part: &Path,
        written: u64,
        total: Option<u64>,
    ) -> Result<()> {
        if let Some(total) = total {
            if written != total {
                return Err(MediaError::CorruptTransfer(format!(
                    "received {} bytes, server reported {}",
                    written, total
                )));
            }
        }
        if let Some(expected) = request.expected_size {
            if written != expected {
                return Err(MediaError::CorruptTransfer(format!(
                    "received {} bytes, expected {}",
                    written, expected
                )));
            }
        }
        if let Some(expected) = &request.sha256 {
            let actual = self.hash_file(part).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(MediaError::CorruptTransfer(format!(
                    "checksum mismatch: expected {}, got {}",
                    expected, actual
                )));
            }
        }
        Ok(())
    }

    async fn hash_file(&self, path: &Path) -> Result<String> {
        let mut reader = self.fs.open_read_stream(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.config.chunk_size];
        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(|e| MediaError::Persistence(format!("read failed: {}", e)))?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    async fn partial_len(&self, part: &Path) -> Result<u64> {
        if self.fs.exists(part).await? {
            Ok(self.fs.metadata(part).await?.size)
        } else {
            Ok(0)
        }
    }

    async fn discard_partial(&self, destination: &Path) -> Result<()> {
        self.remove_if_exists(&partial_path(destination)).await
    }

    async fn remove_if_exists(&self, path: &Path) -> Result<()> {
        if self.fs.exists(path).await? {
            self.fs.delete_file(path).await?;
        }
        Ok(())
    }
}

fn notify(listeners: &Mutex<Vec<ProgressCallback>>, written: u64, total: Option<u64>) {
    let progress = TransferProgress {
        bytes_downloaded: written,
        total_bytes: total,
    };
    let callbacks: Vec<ProgressCallback> = listeners.lock().clone();
    for callback in callbacks {
        callback(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_appends_suffix() {
        let dest = Path::new("/media/video-1.media");
        let part = partial_path(dest);
        assert_eq!(part, PathBuf::from("/media/video-1.media.part"));
        assert!(is_partial_path(&part));
        assert!(!is_partial_path(dest));
    }

    #[test]
    fn test_progress_percent() {
        let progress = TransferProgress {
            bytes_downloaded: 25,
            total_bytes: Some(100),
        };
        assert_eq!(progress.percent(), Some(25));

        let unknown = TransferProgress {
            bytes_downloaded: 25,
            total_bytes: None,
        };
        assert_eq!(unknown.percent(), None);
    }
}
