//! End-to-end tests for the offline core façade
//!
//! These tests boot the whole core over in-memory bridges and verify:
//! - Offline writes are durable locally and replayed after reconnect
//! - Replay through the configured HTTP endpoint
//! - Queue persistence across a restart
//! - Remote-only media when no file system is available

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{DynAsyncRead, HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkType};
use bridge_traits::storage::SettingsStore;
use bytes::Bytes;
use core_media::AssetInfo;
use core_runtime::config::{CoreConfig, CoreConfigBuilder, MediaCacheConfig};
use core_runtime::events::{CoreEvent, SyncEvent};
use core_service::OfflineCore;
use core_sync::{RemoteReplay, SyncError, SyncOperation, IDEMPOTENCY_HEADER};
use mockall::mock;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Mock Implementations
// ============================================================================

#[derive(Default)]
struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().keys().cloned().collect())
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.values.lock().clear();
        Ok(())
    }
}

struct ToggleSignal {
    connected: AtomicBool,
}

impl ToggleSignal {
    fn new(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(connected),
        })
    }

    fn set(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkMonitor for ToggleSignal {
    async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(NetworkInfo::connected(NetworkType::Ethernet))
        } else {
            Ok(NetworkInfo::disconnected())
        }
    }

    async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
        Err(BridgeError::NotAvailable("change stream".to_string()))
    }
}

#[derive(Default)]
struct RecordingReplay {
    replayed: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteReplay for RecordingReplay {
    async fn replay(&self, operation: &SyncOperation) -> core_sync::Result<()> {
        self.replayed.lock().push(operation.key.clone());
        Ok(())
    }
}

mock! {
    Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn download_stream(&self, url: String) -> BridgeResult<Box<DynAsyncRead>>;
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn builder(
    storage: Arc<MemorySettingsStore>,
    signal: Arc<ToggleSignal>,
    http: Arc<dyn HttpClient>,
) -> CoreConfigBuilder {
    CoreConfig::builder()
        .settings_store(storage)
        .http_client(http)
        .network_monitor(signal)
        .media(MediaCacheConfig::default().with_remote_only(true))
}

fn idle_http() -> Arc<dyn HttpClient> {
    Arc::new(MockHttp::new())
}

async fn wait_until_drained(core: &OfflineCore) {
    let mut pending = core.sync_queue().subscribe_pending();
    tokio::time::timeout(Duration::from_secs(5), pending.wait_for(|n| *n == 0))
        .await
        .expect("queue did not drain")
        .unwrap();
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_offline_write_replays_after_reconnect() {
    let storage = Arc::new(MemorySettingsStore::default());
    let signal = ToggleSignal::new(false);
    let replay = Arc::new(RecordingReplay::default());
    let config = builder(storage, signal.clone(), idle_http()).build().unwrap();

    let core = OfflineCore::init_with_replay(config, replay.clone())
        .await
        .unwrap();
    assert!(!core.is_online());

    core.kv().set("token", "abc", true).await.unwrap();
    assert_eq!(core.sync_queue().pending_count(), 1);
    assert_eq!(
        core.kv().get::<String>("token").await.unwrap(),
        Some("abc".to_string())
    );
    assert!(replay.replayed.lock().is_empty());

    signal.set(true);
    assert!(core.connectivity().poll().await);

    wait_until_drained(&core).await;
    assert_eq!(*replay.replayed.lock(), vec!["token".to_string()]);
    assert!(core.sync_queue().last_synced_at().is_some());

    core.shutdown().await;
}

#[tokio::test]
async fn test_queued_write_is_posted_to_endpoint() {
    let storage = Arc::new(MemorySettingsStore::default());
    let signal = ToggleSignal::new(true);

    let mut http = MockHttp::new();
    http.expect_execute()
        .withf(|request| {
            request.method == HttpMethod::Post
                && request.url == "https://api.test/sync"
                && request.headers.contains_key(IDEMPOTENCY_HEADER)
        })
        .times(1)
        .returning(|_| {
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::new(),
            })
        });

    let config = builder(storage, signal, Arc::new(http))
        .sync_endpoint("https://api.test/sync")
        .build()
        .unwrap();
    let core = OfflineCore::init(config).await.unwrap();

    core.kv()
        .set("profile", &json!({ "name": "Ada" }), true)
        .await
        .unwrap();

    wait_until_drained(&core).await;
    core.shutdown().await;
}

#[tokio::test]
async fn test_without_endpoint_writes_stay_queued() {
    let storage = Arc::new(MemorySettingsStore::default());
    let signal = ToggleSignal::new(true);
    let config = builder(storage, signal, idle_http()).build().unwrap();

    let core = OfflineCore::init(config).await.unwrap();
    core.kv().set("token", "abc", true).await.unwrap();
    let _ = core.sync_queue().drain().await;

    assert_eq!(core.sync_queue().pending_count(), 1);
    assert!(core.sync_queue().last_synced_at().is_none());

    core.shutdown().await;
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let storage = Arc::new(MemorySettingsStore::default());

    let offline = ToggleSignal::new(false);
    let config = builder(storage.clone(), offline, idle_http())
        .build()
        .unwrap();
    let core = OfflineCore::init_with_replay(config, Arc::new(RecordingReplay::default()))
        .await
        .unwrap();
    core.kv().set("a", &1, true).await.unwrap();
    core.kv().set("b", &2, true).await.unwrap();
    core.shutdown().await;
    drop(core);

    let online = ToggleSignal::new(true);
    let replay = Arc::new(RecordingReplay::default());
    let config = builder(storage, online, idle_http()).build().unwrap();
    let core = OfflineCore::init_with_replay(config, replay.clone())
        .await
        .unwrap();

    wait_until_drained(&core).await;
    assert_eq!(
        *replay.replayed.lock(),
        vec!["a".to_string(), "b".to_string()]
    );

    core.shutdown().await;
}

#[tokio::test]
async fn test_components_share_one_event_bus() {
    let storage = Arc::new(MemorySettingsStore::default());
    let signal = ToggleSignal::new(false);
    let config = builder(storage, signal, idle_http()).build().unwrap();
    let core = OfflineCore::init_with_replay(config, Arc::new(RecordingReplay::default()))
        .await
        .unwrap();

    let mut rx = core.events().subscribe();
    core.kv().set("token", "abc", true).await.unwrap();

    let event = rx.recv().await.unwrap();
    assert!(matches!(
        event,
        CoreEvent::Sync(SyncEvent::Enqueued { ref key, pending: 1, .. }) if key == "token"
    ));

    core.shutdown().await;
}

#[tokio::test]
async fn test_media_falls_back_to_remote_references() {
    let storage = Arc::new(MemorySettingsStore::default());
    let signal = ToggleSignal::new(true);
    let config = builder(storage, signal, idle_http()).build().unwrap();
    let core = OfflineCore::init(config).await.unwrap();

    assert!(core.media().is_remote_only());
    let asset = core
        .media()
        .download(AssetInfo::new("lesson-1", "https://cdn.test/lesson-1.mp4", 1024))
        .await
        .unwrap();
    assert!(asset.is_remote_only());
    assert_eq!(core.media().stats().await.used_bytes, 0);

    core.shutdown().await;
}

#[tokio::test]
async fn test_invalid_media_budget_is_rejected() {
    let storage = Arc::new(MemorySettingsStore::default());
    let signal = ToggleSignal::new(true);

    let result = builder(storage, signal, idle_http())
        .media(MediaCacheConfig::default().with_max_bytes(0))
        .build();

    assert!(result.is_err());
}

#[tokio::test]
async fn test_replay_failures_are_retried_on_next_drain() {
    struct FlakyReplay {
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl RemoteReplay for FlakyReplay {
        async fn replay(&self, _operation: &SyncOperation) -> core_sync::Result<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(SyncError::Network("HTTP 503".to_string()));
            }
            Ok(())
        }
    }

    let storage = Arc::new(MemorySettingsStore::default());
    let signal = ToggleSignal::new(false);
    let config = builder(storage, signal.clone(), idle_http()).build().unwrap();
    let replay = Arc::new(FlakyReplay {
        fail_next: AtomicBool::new(true),
    });
    let core = OfflineCore::init_with_replay(config, replay).await.unwrap();

    core.kv().set("token", "abc", true).await.unwrap();
    signal.set(true);
    core.connectivity().poll().await;
    assert_eq!(core.sync_queue().pending_count(), 1);

    let report = core.sync_now().await.unwrap();
    assert_eq!(report.replayed, 1);
    assert_eq!(core.sync_queue().pending_count(), 0);

    core.shutdown().await;
}
