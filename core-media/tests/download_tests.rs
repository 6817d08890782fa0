//! Integration tests for resumable transfers
//!
//! These tests drive the download controller against a scripted HTTP server
//! and a real scratch directory, covering:
//! - Resume from partial bytes with `Range`
//! - Servers that ignore ranges or answer 416
//! - Cancellation policies
//! - Size and checksum verification
//! - Attaching to an in-flight transfer

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{DynAsyncRead, HttpClient, HttpRequest, HttpResponse, RangeResponse};
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use core_media::download::partial_path;
use core_media::{
    CancelPolicy, DownloadController, FetchRequest, MediaError, ProgressCallback,
    TransferProgress,
};
use core_runtime::config::DownloadConfig;
use futures::stream::{self, StreamExt};
use mockall::mock;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio_util::io::StreamReader;

// ============================================================================
// Scripted Server
// ============================================================================

enum Tail {
    Fail,
    Hold(Arc<Semaphore>),
    Hang,
}

struct Fault {
    after: usize,
    tail: Tail,
}

/// HTTP client serving fixed resources with optional one-shot faults
#[derive(Default)]
struct ScriptedHttp {
    resources: Mutex<HashMap<String, Bytes>>,
    faults: Mutex<HashMap<String, Fault>>,
    ignore_ranges: AtomicBool,
    requests: Mutex<Vec<(String, u64)>>,
}

impl ScriptedHttp {
    fn serve(&self, url: &str, data: Bytes) {
        self.resources.lock().insert(url.to_string(), data);
    }

    fn interrupt_after(&self, url: &str, after: usize) {
        self.faults.lock().insert(
            url.to_string(),
            Fault {
                after,
                tail: Tail::Fail,
            },
        );
    }

    fn hold_after(&self, url: &str, after: usize) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.faults.lock().insert(
            url.to_string(),
            Fault {
                after,
                tail: Tail::Hold(gate.clone()),
            },
        );
        gate
    }

    fn hang_after(&self, url: &str, after: usize) {
        self.faults.lock().insert(
            url.to_string(),
            Fault {
                after,
                tail: Tail::Hang,
            },
        );
    }

    fn requests(&self) -> Vec<(String, u64)> {
        self.requests.lock().clone()
    }
}

fn chunks(data: Bytes) -> Vec<io::Result<Bytes>> {
    data.chunks(8)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect()
}

fn body(data: Bytes, fault: Option<Fault>) -> Box<DynAsyncRead> {
    let stream = match fault {
        None => stream::iter(chunks(data)).boxed(),
        Some(Fault { after, tail }) => {
            let split = after.min(data.len());
            let head = stream::iter(chunks(data.slice(..split)));
            let rest = data.slice(split..);
            match tail {
                Tail::Fail => head
                    .chain(stream::once(async {
                        Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))
                    }))
                    .boxed(),
                Tail::Hold(gate) => head
                    .chain(
                        stream::once(async move {
                            let _permit = gate.acquire().await;
                            stream::iter(chunks(rest))
                        })
                        .flatten(),
                    )
                    .boxed(),
                Tail::Hang => head.chain(stream::pending()).boxed(),
            }
        }
    };
    Box::new(StreamReader::new(stream))
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable("execute".to_string()))
    }

    async fn download_stream(&self, url: String) -> BridgeResult<Box<DynAsyncRead>> {
        Ok(self.download_range(url, 0).await?.body)
    }

    async fn download_range(&self, url: String, offset: u64) -> BridgeResult<RangeResponse> {
        self.requests.lock().push((url.clone(), offset));
        let data = self
            .resources
            .lock()
            .get(&url)
            .cloned()
            .ok_or_else(|| BridgeError::HttpStatus {
                status: 404,
                message: url.clone(),
            })?;
        let fault = self.faults.lock().remove(&url);
        let len = data.len() as u64;

        if offset == 0 || self.ignore_ranges.load(Ordering::SeqCst) {
            return Ok(RangeResponse {
                status: 200,
                total_size: Some(len),
                body: body(data, fault),
            });
        }
        if offset >= len {
            return Ok(RangeResponse {
                status: 416,
                total_size: Some(len),
                body: body(Bytes::new(), None),
            });
        }
        Ok(RangeResponse {
            status: 206,
            total_size: Some(len),
            body: body(data.slice(offset as usize..), fault),
        })
    }
}

mock! {
    Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn download_stream(&self, url: String) -> BridgeResult<Box<DynAsyncRead>>;
        async fn download_range(&self, url: String, offset: u64) -> BridgeResult<RangeResponse>;
    }
}

// ============================================================================
// Harness
// ============================================================================

const URL: &str = "https://cdn.test/lesson.mp4";

fn content(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

struct Harness {
    root: PathBuf,
    fs: Arc<TokioFileSystem>,
    http: Arc<ScriptedHttp>,
    controller: DownloadController,
    destination: PathBuf,
}

fn harness(config: DownloadConfig) -> Harness {
    let root = std::env::temp_dir().join(format!("core-media-dl-{}", uuid::Uuid::new_v4()));
    let fs = Arc::new(TokioFileSystem::with_data_directory(root.join("data")));
    let http = Arc::new(ScriptedHttp::default());
    http.serve(URL, content(100));
    let controller = DownloadController::new(http.clone(), fs.clone(), config);
    let destination = root.join("media").join("lesson.media");
    Harness {
        root,
        fs,
        http,
        controller,
        destination,
    }
}

impl Harness {
    fn request(&self) -> FetchRequest {
        FetchRequest::new(URL, self.destination.clone())
    }

    async fn seed_partial(&self, data: Bytes) {
        let part = partial_path(&self.destination);
        self.fs.create_dir_all(part.parent().unwrap()).await.unwrap();
        tokio::fs::write(&part, &data).await.unwrap();
    }

    async fn read_destination(&self) -> Bytes {
        Bytes::from(tokio::fs::read(&self.destination).await.unwrap())
    }

    async fn partial_exists(&self) -> bool {
        self.fs
            .exists(&partial_path(&self.destination))
            .await
            .unwrap()
    }

    async fn cleanup(self) {
        let _ = tokio::fs::remove_dir_all(self.root).await;
    }
}

/// Progress callback that records every report and wakes `reached` once
/// `threshold` bytes are written.
fn recorder(threshold: u64) -> (ProgressCallback, Arc<Mutex<Vec<u64>>>, Arc<Notify>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let reached = Arc::new(Notify::new());
    let callback_seen = seen.clone();
    let callback_reached = reached.clone();
    let callback: ProgressCallback = Arc::new(move |progress: TransferProgress| {
        callback_seen.lock().push(progress.bytes_downloaded);
        if progress.bytes_downloaded >= threshold {
            callback_reached.notify_one();
        }
    });
    (callback, seen, reached)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_fresh_download_reports_progress() {
    let h = harness(DownloadConfig::default().with_chunk_size(16));
    let (callback, seen, _) = recorder(u64::MAX);

    let result = h
        .controller
        .fetch(h.request().with_expected_size(100), Some(callback))
        .await
        .unwrap();

    assert_eq!(result.size_bytes, 100);
    assert_eq!(result.path, h.destination);
    assert_eq!(h.read_destination().await, content(100));
    assert!(!h.partial_exists().await);

    let seen = seen.lock().clone();
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!(!h.controller.is_active(&h.destination));

    h.cleanup().await;
}

#[tokio::test]
async fn test_resume_from_partial_is_byte_identical() {
    let h = harness(DownloadConfig::default());
    h.seed_partial(content(100).slice(..40)).await;

    let result = h.controller.fetch(h.request(), None).await.unwrap();

    assert_eq!(result.size_bytes, 100);
    assert_eq!(h.http.requests(), vec![(URL.to_string(), 40)]);
    assert_eq!(h.read_destination().await, content(100));
    assert!(!h.partial_exists().await);

    h.cleanup().await;
}

#[tokio::test]
async fn test_interrupted_transfer_keeps_partial_for_resume() {
    let h = harness(DownloadConfig::default());
    h.http.interrupt_after(URL, 40);

    let err = h.controller.fetch(h.request(), None).await.unwrap_err();
    assert!(matches!(err, MediaError::Network(_)));
    assert!(err.is_retryable());
    assert_eq!(h.controller.partial_len(&h.destination).await.unwrap(), 40);

    h.controller.fetch(h.request(), None).await.unwrap();
    assert_eq!(
        h.http.requests(),
        vec![(URL.to_string(), 0), (URL.to_string(), 40)]
    );
    assert_eq!(h.read_destination().await, content(100));

    h.cleanup().await;
}

#[tokio::test]
async fn test_server_ignoring_range_restarts_from_zero() {
    let h = harness(DownloadConfig::default());
    h.http.ignore_ranges.store(true, Ordering::SeqCst);
    h.seed_partial(Bytes::from(vec![0xAA; 40])).await;

    let result = h.controller.fetch(h.request(), None).await.unwrap();

    assert_eq!(result.size_bytes, 100);
    assert_eq!(h.http.requests(), vec![(URL.to_string(), 40)]);
    assert_eq!(h.read_destination().await, content(100));

    h.cleanup().await;
}

#[tokio::test]
async fn test_range_past_end_finalizes_complete_partial() {
    let h = harness(DownloadConfig::default());
    h.seed_partial(content(100)).await;

    let result = h
        .controller
        .fetch(h.request().with_sha256(sha256_hex(&content(100))), None)
        .await
        .unwrap();

    assert_eq!(result.size_bytes, 100);
    assert_eq!(h.http.requests(), vec![(URL.to_string(), 100)]);
    assert_eq!(h.read_destination().await, content(100));

    h.cleanup().await;
}

#[tokio::test]
async fn test_oversized_partial_restarts() {
    let h = harness(DownloadConfig::default());
    h.seed_partial(Bytes::from(vec![0xAA; 120])).await;

    let result = h.controller.fetch(h.request(), None).await.unwrap();

    assert_eq!(result.size_bytes, 100);
    assert_eq!(
        h.http.requests(),
        vec![(URL.to_string(), 120), (URL.to_string(), 0)]
    );
    assert_eq!(h.read_destination().await, content(100));

    h.cleanup().await;
}

#[tokio::test]
async fn test_cancel_keeps_partial_then_resumes() {
    let h = harness(DownloadConfig::default());
    let _gate = h.http.hold_after(URL, 32);
    let (callback, _, reached) = recorder(32);

    let controller = h.controller.clone();
    let request = h.request();
    let transfer = tokio::spawn(async move { controller.fetch(request, Some(callback)).await });

    reached.notified().await;
    assert!(h.controller.transfer_id(&h.destination).is_some());
    assert!(h.controller.cancel_path(&h.destination));

    let err = transfer.await.unwrap().unwrap_err();
    assert!(matches!(err, MediaError::Cancelled(_)));
    assert!(!err.is_retryable());
    assert_eq!(h.controller.partial_len(&h.destination).await.unwrap(), 32);
    assert!(!h.fs.exists(&h.destination).await.unwrap());

    h.controller.fetch(h.request(), None).await.unwrap();
    assert_eq!(h.http.requests().last(), Some(&(URL.to_string(), 32)));
    assert_eq!(h.read_destination().await, content(100));

    h.cleanup().await;
}

#[tokio::test]
async fn test_cancel_with_discard_removes_partial() {
    let h = harness(DownloadConfig::default());
    let _gate = h.http.hold_after(URL, 32);
    let (callback, _, reached) = recorder(32);

    let controller = h.controller.clone();
    let request = h.request().with_cancel_policy(CancelPolicy::Discard);
    let transfer = tokio::spawn(async move { controller.fetch(request, Some(callback)).await });

    reached.notified().await;
    let id = h.controller.transfer_id(&h.destination).unwrap();
    assert!(h.controller.cancel(&id));

    let err = transfer.await.unwrap().unwrap_err();
    assert!(matches!(err, MediaError::Cancelled(_)));
    assert!(!h.partial_exists().await);
    assert!(!h.controller.is_active(&h.destination));

    h.cleanup().await;
}

#[tokio::test]
async fn test_size_mismatch_discards_partial() {
    let h = harness(DownloadConfig::default());

    let err = h
        .controller
        .fetch(h.request().with_expected_size(90), None)
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::CorruptTransfer(_)));
    assert!(!h.partial_exists().await);
    assert!(!h.fs.exists(&h.destination).await.unwrap());

    h.cleanup().await;
}

#[tokio::test]
async fn test_checksum_mismatch_is_corrupt() {
    let h = harness(DownloadConfig::default());

    let err = h
        .controller
        .fetch(h.request().with_sha256(sha256_hex(b"something else")), None)
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::CorruptTransfer(_)));
    assert!(err.is_retryable());
    assert!(!h.partial_exists().await);

    h.cleanup().await;
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_transfer() {
    let h = harness(DownloadConfig::default());
    let gate = h.http.hold_after(URL, 16);

    let (first, second, _) = tokio::join!(
        h.controller.fetch(h.request(), None),
        h.controller.fetch(h.request(), None),
        async {
            tokio::task::yield_now().await;
            gate.add_permits(1);
        }
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(h.http.requests().len(), 1);
    assert_eq!(h.read_destination().await, content(100));

    h.cleanup().await;
}

#[tokio::test]
async fn test_stalled_transfer_times_out() {
    let h = harness(DownloadConfig::default().with_stall_timeout(Duration::from_millis(50)));
    h.http.hang_after(URL, 16);

    let err = h.controller.fetch(h.request(), None).await.unwrap_err();

    assert!(matches!(err, MediaError::Network(_)));
    assert_eq!(h.controller.partial_len(&h.destination).await.unwrap(), 16);

    h.cleanup().await;
}

#[tokio::test]
async fn test_transport_failure_is_network_error() {
    let root = std::env::temp_dir().join(format!("core-media-dl-{}", uuid::Uuid::new_v4()));
    let fs = Arc::new(TokioFileSystem::with_data_directory(root.join("data")));

    let mut http = MockHttp::new();
    http.expect_download_range()
        .times(1)
        .returning(|_, _| Err(BridgeError::OperationFailed("connection refused".to_string())));

    let controller = DownloadController::new(Arc::new(http), fs, DownloadConfig::default());
    let err = controller
        .fetch(FetchRequest::new(URL, root.join("a.media")), None)
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Network(_)));

    let _ = tokio::fs::remove_dir_all(root).await;
}
