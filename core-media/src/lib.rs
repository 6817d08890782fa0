//! # Media Module
//!
//! Offline media storage for the persistence core.
//!
//! ## Overview
//!
//! This module handles:
//! - Resumable, verified byte transfers (`download`)
//! - The budgeted media cache with LRU eviction and watch tracking (`cache`)

pub mod cache;
pub mod download;
pub mod error;

pub use cache::{
    AssetFilter, AssetInfo, AssetMetadata, AssetState, DownloadHandle, DownloadProgress,
    MediaCache, PinGuard, SortOrder, StorageStats,
};
pub use download::{
    CancelPolicy, DownloadController, FetchRequest, FetchResult, ProgressCallback, TransferId,
    TransferProgress,
};
pub use error::{MediaError, Result};
