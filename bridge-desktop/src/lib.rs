//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides implementations of the bridge traits using
//! desktop-appropriate libraries:
//! - `HttpClient` using `reqwest`, including `Range` downloads
//! - `FileSystemAccess` using `tokio::fs`
//! - `SettingsStore` using a SQLite-backed key-value table
//! - `NetworkMonitor` using a TCP reachability check
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteSettingsStore, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client = ReqwestHttpClient::new();
//!     let fs = TokioFileSystem::new();
//!     let store = SqliteSettingsStore::new("offline.db".into()).await.unwrap();
//!
//!     // Hand these to CoreConfig::builder()
//! }
//! ```

mod filesystem;
mod http;
mod network;
mod settings;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use network::DesktopNetworkMonitor;
pub use settings::SqliteSettingsStore;
