//! # Sync Queue
//!
//! Durable FIFO of writes waiting to be replayed against the remote.
//!
//! ## Overview
//!
//! Every write made with `sync = true` becomes a [`SyncOperation`] appended
//! to the queue. The queue is persisted through the [`SettingsStore`] under
//! [`QUEUE_STORAGE_KEY`] before `enqueue` returns, so a crash never loses an
//! acknowledged write.
//!
//! ## Features
//!
//! - **Durability**: queue state is persisted on every change; in-memory state
//!   only changes after the persist succeeds
//! - **FIFO replay**: operations replay in enqueue order; confirmed operations
//!   are removed, failed ones stay queued in their relative order
//! - **Same-key ordering**: once an operation for a key fails, later
//!   operations for that key wait for the next drain
//! - **Single-flight drains**: a drain requested while one runs is folded into
//!   the running drain
//! - **Coalescing**: optionally, a new write replaces queued writes for the
//!   same key
//!
//! ## Usage
//!
//! ```ignore
//! let queue = SyncQueue::new(storage, replay, connectivity, events, clock, true).await?;
//! queue.enqueue("profile", json!({"name": "Ada"})).await?;
//! let report = queue.drain().await?;
//! ```

use async_trait::async_trait;
use bridge_traits::clock::Clock;
use bridge_traits::storage::SettingsStore;
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::connectivity::{ConnectivityMonitor, ReconnectHandler};
use crate::error::{Result, SyncError};

/// Storage key holding the serialized queue.
pub const QUEUE_STORAGE_KEY: &str = "__sync_queue";

/// Idempotency identifier of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidOperationId(format!("{}: {}", s, e)))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A write waiting to be replayed remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: OperationId,
    pub key: String,
    pub value: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    /// Failed replay attempts so far
    #[serde(default)]
    pub attempts: u32,
}

impl SyncOperation {
    pub fn new(key: impl Into<String>, value: serde_json::Value, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: OperationId::new(),
            key: key.into(),
            value,
            enqueued_at,
            attempts: 0,
        }
    }
}

/// Remote endpoint that accepts replayed operations.
///
/// Implementations must treat [`SyncOperation::id`] as an idempotency key:
/// the same operation may be delivered more than once.
#[async_trait]
pub trait RemoteReplay: Send + Sync {
    async fn replay(&self, operation: &SyncOperation) -> Result<()>;
}

/// Outcome of a drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations confirmed by the remote and removed
    pub replayed: usize,
    /// Replay attempts that failed
    pub failed: usize,
    /// Queue length when the drain finished
    pub pending: usize,
    /// The drain stopped because the device was offline
    pub skipped_offline: bool,
    /// Another drain was running; this request was folded into it
    pub coalesced: bool,
}

impl DrainReport {
    fn absorb(&mut self, pass: DrainReport) {
        self.replayed += pass.replayed;
        self.failed += pass.failed;
        self.pending = pass.pending;
        self.skipped_offline = pass.skipped_offline;
    }
}

pub struct SyncQueue {
    storage: Arc<dyn SettingsStore>,
    replay: Arc<dyn RemoteReplay>,
    connectivity: Arc<ConnectivityMonitor>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    coalesce_writes: bool,
    operations: Mutex<VecDeque<SyncOperation>>,
    drain_lock: Mutex<()>,
    rerun_requested: AtomicBool,
    pending_tx: watch::Sender<usize>,
    last_synced_at: parking_lot::Mutex<Option<DateTime<Utc>>>,
}

impl SyncQueue {
    /// Load the persisted queue and register for reconnect notifications.
    ///
    /// A queue that cannot be decoded is logged and treated as empty; a
    /// storage read failure is returned.
    pub async fn new(
        storage: Arc<dyn SettingsStore>,
        replay: Arc<dyn RemoteReplay>,
        connectivity: Arc<ConnectivityMonitor>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        coalesce_writes: bool,
    ) -> Result<Arc<Self>> {
        let restored = match storage.get_string(QUEUE_STORAGE_KEY).await? {
            Some(raw) => match serde_json::from_str::<Vec<SyncOperation>>(&raw) {
                Ok(ops) => ops,
                Err(e) => {
                    warn!(error = %e, "Persisted sync queue is corrupt, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if !restored.is_empty() {
            info!(pending = restored.len(), "Restored sync queue");
        }

        let (pending_tx, _) = watch::channel(restored.len());
        let queue = Arc::new(Self {
            storage,
            replay,
            connectivity: Arc::clone(&connectivity),
            events,
            clock,
            coalesce_writes,
            operations: Mutex::new(restored.into()),
            drain_lock: Mutex::new(()),
            rerun_requested: AtomicBool::new(false),
            pending_tx,
            last_synced_at: parking_lot::Mutex::new(None),
        });

        let handler: Arc<dyn ReconnectHandler> = queue.clone();
        connectivity.set_reconnect_handler(Arc::downgrade(&handler));

        Ok(queue)
    }

    /// Append an operation and persist the queue.
    ///
    /// Returns only after the queue is durable. When coalescing is enabled,
    /// queued operations for the same key are dropped first.
    #[instrument(skip(self, value))]
    pub async fn enqueue(&self, key: &str, value: serde_json::Value) -> Result<SyncOperation> {
        let operation = SyncOperation::new(key, value, self.clock.now());

        let pending = {
            let mut operations = self.operations.lock().await;
            let mut next = operations.clone();
            if self.coalesce_writes {
                let before = next.len();
                next.retain(|op| op.key != key);
                if next.len() < before {
                    debug!(replaced = before - next.len(), "Coalesced queued writes");
                }
            }
            next.push_back(operation.clone());
            self.persist(&next).await?;
            *operations = next;
            operations.len()
        };

        self.pending_tx.send_replace(pending);
        let _ = self.events.emit(CoreEvent::Sync(SyncEvent::Enqueued {
            operation_id: operation.id.to_string(),
            key: operation.key.clone(),
            pending,
        }));
        debug!(operation_id = %operation.id, pending, "Operation enqueued");

        Ok(operation)
    }

    /// Replay queued operations in FIFO order.
    ///
    /// Does nothing while offline. Remote failures are counted in the report,
    /// never returned; only local persistence failures are errors. An
    /// operation that fails is not retried again within the same call, even
    /// when a folded-in request makes the drain run another pass.
    pub async fn drain(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        let mut first_round = true;
        // Operations that failed earlier in this call wait for the next drain.
        let mut failed_ids = HashSet::new();

        loop {
            let Ok(_guard) = self.drain_lock.try_lock() else {
                self.rerun_requested.store(true, Ordering::SeqCst);
                if !first_round {
                    return Ok(report);
                }
                debug!("Drain already running, request folded into it");
                return Ok(DrainReport {
                    coalesced: true,
                    pending: self.pending_count(),
                    ..DrainReport::default()
                });
            };
            first_round = false;

            loop {
                self.rerun_requested.store(false, Ordering::SeqCst);
                let pass = self.drain_pass(&mut failed_ids).await?;
                let offline = pass.skipped_offline;
                report.absorb(pass);
                if offline || !self.rerun_requested.load(Ordering::SeqCst) {
                    break;
                }
            }

            drop(_guard);

            // A request that lost the race for the lock after our last check
            // has to be served by us.
            if report.skipped_offline || !self.rerun_requested.load(Ordering::SeqCst) {
                break;
            }
        }

        Ok(report)
    }

    /// Manual sync trigger, independent of connectivity transitions.
    ///
    /// Same semantics as [`drain`](Self::drain): a no-op while offline, and
    /// folded into a drain that is already running.
    #[instrument(skip(self))]
    pub async fn sync_now(&self) -> Result<DrainReport> {
        info!(pending = self.pending_count(), "Manual sync requested");
        self.drain().await
    }

    /// Start a drain in the background if the device is online.
    pub fn request_drain(self: &Arc<Self>) {
        if !self.connectivity.current_state() {
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = queue.drain().await {
                warn!(error = %e, "Background sync drain failed");
            }
        });
    }

    pub fn pending_count(&self) -> usize {
        *self.pending_tx.borrow()
    }

    /// Watch the pending count; the receiver sees every change.
    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.pending_tx.subscribe()
    }

    /// Time of the last drain that left nothing failed.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        *self.last_synced_at.lock()
    }

    /// Snapshot of the queued operations in replay order.
    pub async fn operations(&self) -> Vec<SyncOperation> {
        self.operations.lock().await.iter().cloned().collect()
    }

    #[instrument(skip_all)]
    async fn drain_pass(&self, failed_ids: &mut HashSet<OperationId>) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        if !self.connectivity.current_state() {
            report.skipped_offline = true;
            report.pending = self.pending_count();
            return Ok(report);
        }

        let snapshot = self.operations().await;
        if snapshot.is_empty() {
            return Ok(report);
        }

        let _ = self.events.emit(CoreEvent::Sync(SyncEvent::DrainStarted {
            pending: snapshot.len(),
        }));

        let mut blocked_keys: HashSet<String> = HashSet::new();
        let mut failed_now = Vec::new();

        for operation in snapshot {
            if failed_ids.contains(&operation.id) {
                blocked_keys.insert(operation.key.clone());
                continue;
            }
            if blocked_keys.contains(&operation.key) {
                continue;
            }
            if !self.connectivity.current_state() {
                report.skipped_offline = true;
                break;
            }

            match self.replay.replay(&operation).await {
                Ok(()) => {
                    self.remove_confirmed(operation.id).await?;
                    report.replayed += 1;
                }
                Err(e) => {
                    warn!(
                        operation_id = %operation.id,
                        key = %operation.key,
                        error = %e,
                        "Replay failed, operation stays queued"
                    );
                    blocked_keys.insert(operation.key.clone());
                    failed_ids.insert(operation.id);
                    failed_now.push(operation.id);
                    report.failed += 1;
                }
            }
        }

        self.record_failures(&failed_now).await?;

        report.pending = self.pending_count();
        if failed_ids.is_empty() && !report.skipped_offline {
            *self.last_synced_at.lock() = Some(self.clock.now());
        }

        info!(
            replayed = report.replayed,
            failed = report.failed,
            pending = report.pending,
            "Sync drain pass finished"
        );
        let _ = self.events.emit(CoreEvent::Sync(SyncEvent::DrainCompleted {
            replayed: report.replayed,
            failed: report.failed,
            pending: report.pending,
        }));

        Ok(report)
    }

    async fn remove_confirmed(&self, id: OperationId) -> Result<()> {
        let pending = {
            let mut operations = self.operations.lock().await;
            let Some(index) = operations.iter().position(|op| op.id == id) else {
                // Replaced by a coalesced write while in flight
                return Ok(());
            };
            let mut next = operations.clone();
            next.remove(index);
            self.persist(&next).await?;
            *operations = next;
            operations.len()
        };
        self.pending_tx.send_replace(pending);
        Ok(())
    }

    async fn record_failures(&self, ids: &[OperationId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut operations = self.operations.lock().await;
        let mut next = operations.clone();
        let mut changed = false;
        for op in next.iter_mut().filter(|op| ids.contains(&op.id)) {
            op.attempts += 1;
            changed = true;
        }
        if changed {
            self.persist(&next).await?;
            *operations = next;
        }
        Ok(())
    }

    async fn persist(&self, operations: &VecDeque<SyncOperation>) -> Result<()> {
        let encoded = serde_json::to_string(operations)?;
        self.storage
            .set_string(QUEUE_STORAGE_KEY, &encoded)
            .await
            .map_err(|e| SyncError::Persistence(format!("sync queue: {}", e)))
    }
}

#[async_trait]
impl ReconnectHandler for SyncQueue {
    async fn on_reconnect(&self) {
        info!(pending = self.pending_count(), "Back online, draining sync queue");
        if let Err(e) = self.drain().await {
            warn!(error = %e, "Sync drain after reconnect failed");
        }
    }
}

impl fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncQueue")
            .field("pending", &self.pending_count())
            .field("coalesce_writes", &self.coalesce_writes)
            .finish()
    }
}
