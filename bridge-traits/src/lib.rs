//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host platform implements for the
//! offline persistence core.
//!
//! ## Overview
//!
//! This crate defines the contract between the core and platform-specific
//! implementations. Each trait is a capability the core needs but that must be
//! provided differently per platform (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP, ranged downloads for resumable transfers
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for downloaded media
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Durable key-value primitive holding opaque strings
//!
//! ### Platform Integration
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity signal and change stream
//!
//! ### Utilities
//! - [`Clock`](clock::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](log_sink::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | iOS      | TBD                 | 📋 Planned |
//! | Android  | TBD                 | 📋 Planned |
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing. Optional capabilities (`NetworkMonitor`, `FileSystemAccess`) put
//! the core into a documented degraded mode instead.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Provide actionable error messages
//! - Include error context (e.g., file paths, HTTP status)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across async
//! tasks behind an `Arc`.
//!
//! ## Examples
//!
//! ### Implementing SettingsStore
//!
//! ```ignore
//! use bridge_traits::storage::SettingsStore;
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct PrefsStore { /* ... */ }
//!
//! #[async_trait]
//! impl SettingsStore for PrefsStore {
//!     async fn set_string(&self, key: &str, value: &str) -> Result<()> { todo!() }
//!     async fn get_string(&self, key: &str) -> Result<Option<String>> { todo!() }
//!     async fn delete(&self, key: &str) -> Result<()> { todo!() }
//!     async fn list_keys(&self) -> Result<Vec<String>> { todo!() }
//!     async fn clear_all(&self) -> Result<()> { todo!() }
//! }
//! ```

pub mod clock;
pub mod error;
pub mod http;
pub mod log_sink;
pub mod network;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{
    DynAsyncRead, HttpClient, HttpMethod, HttpRequest, HttpResponse, RangeResponse, RetryPolicy,
};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::{DynAsyncWrite, FileMetadata, FileSystemAccess, SettingsStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use log_sink::{LogEntry, LogLevel, LoggerSink};
