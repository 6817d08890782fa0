//! # Sync Module
//!
//! Offline-first key/value persistence with deferred remote replay.
//!
//! ## Overview
//!
//! Writes always land locally first. Writes flagged for sync are queued and
//! replayed against the remote once the device is online:
//! - Tracking online/offline state from the platform signal or a reachability check
//! - Persisting values locally as JSON
//! - Queuing synced writes durably and replaying them in order
//! - Draining the queue automatically on reconnect
//!
//! ## Components
//!
//! - **Connectivity Monitor** (`connectivity`): Online state, transition listeners, reconnect hook
//! - **Key-Value Store** (`kv_store`): Local reads and writes with per-key ordering
//! - **Sync Queue** (`sync_queue`): Durable FIFO of operations awaiting replay
//! - **Replay** (`replay`): HTTP transport that posts operations to the sync endpoint

pub mod connectivity;
pub mod error;
pub mod kv_store;
pub mod replay;
pub mod sync_queue;

pub use connectivity::{ConnectivityListener, ConnectivityMonitor, ReconnectHandler, Subscription};
pub use error::{Result, SyncError};
pub use kv_store::{KeyValueStore, RESERVED_KEY_PREFIX};
pub use replay::{HttpReplayClient, UnconfiguredReplay, IDEMPOTENCY_HEADER};
pub use sync_queue::{
    DrainReport, OperationId, RemoteReplay, SyncOperation, SyncQueue, QUEUE_STORAGE_KEY,
};
