//! # Offline Media Cache
//!
//! Keeps downloaded media available without network access, within a fixed
//! byte budget.
//!
//! ## Overview
//!
//! - Metadata is stored through the `KeyValueStore`, bytes through the
//!   `FileSystemAccess` bridge
//! - Space is reserved before a download starts; least recently watched
//!   assets are evicted to make room
//! - Pinned assets (for example, the one currently playing) are never evicted
//! - Transfers resume from partial files and are verified before they become
//!   Ready
//! - Without a file system the cache degrades to recording remote references
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │     MediaCache                         │
//! │  - start_download() / download()       │
//! │  - update_watch_progress()             │
//! │  - delete() / set_max_bytes()          │
//! └────────┬───────────────────────────────┘
//!          │
//!          ├──> KeyValueStore (metadata, budget)
//!          ├──> FileSystemAccess (bytes)
//!          ├──> DownloadController (resumable transfers)
//!          └──> PinTable (eviction exemptions)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_media::cache::{AssetInfo, MediaCache};
//!
//! # async fn example(cache: std::sync::Arc<MediaCache>) -> core_media::Result<()> {
//! let info = AssetInfo::new("lesson-1", "https://cdn.example.com/lesson-1.mp4", 50_000_000)
//!     .with_language("en");
//!
//! let handle = cache.start_download(info).await?;
//! let asset = handle.wait().await?;
//!
//! let _pin = cache.pin(&asset.id).await?;
//! cache.update_watch_progress(&asset.id, 95, 1710.0).await?;
//!
//! let stats = cache.stats().await;
//! println!("Cache usage: {:.1}%", stats.percent_used);
//! # Ok(())
//! # }
//! ```

pub mod eviction;
pub mod manager;
pub mod metadata;
pub mod pins;
pub mod stats;

pub use eviction::{plan_eviction, rank_candidates, EvictionPlan};
pub use manager::{DownloadHandle, MediaCache, ASSETS_KEY, MAX_BYTES_KEY};
pub use metadata::{
    AssetFilter, AssetInfo, AssetMetadata, AssetState, SortOrder, COMPLETION_THRESHOLD_PERCENT,
};
pub use pins::{PinGuard, PinTable};
pub use stats::{DownloadProgress, StorageStats};
