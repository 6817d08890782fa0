//! Asset metadata model and queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MediaError, Result};

/// Progress at or above which an asset counts as watched to completion.
pub const COMPLETION_THRESHOLD_PERCENT: u8 = 90;

/// Lifecycle state of a cached asset.
///
/// Evicted and deleted assets have no entry at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    /// Space reserved, transfer not started
    Provisional,
    /// Bytes are being transferred
    Downloading,
    /// Local copy complete and available offline
    Ready,
    /// No local storage; only the remote reference is kept
    RemoteOnly,
}

impl AssetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetState::Provisional => "provisional",
            AssetState::Downloading => "downloading",
            AssetState::Ready => "ready",
            AssetState::RemoteOnly => "remote_only",
        }
    }

    /// Whether the state survives a restart.
    pub fn is_persistent(&self) -> bool {
        matches!(self, AssetState::Ready | AssetState::RemoteOnly)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, AssetState::Provisional | AssetState::Downloading)
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetState {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "provisional" => Ok(AssetState::Provisional),
            "downloading" => Ok(AssetState::Downloading),
            "ready" => Ok(AssetState::Ready),
            "remote_only" => Ok(AssetState::RemoteOnly),
            _ => Err(MediaError::InvalidInput(format!("Invalid asset state: {}", s))),
        }
    }
}

/// Description of an asset to download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub language: String,
    pub category: String,
    /// Advertised size; reconciled against the real size after transfer
    pub size_bytes: u64,
    #[serde(default)]
    pub duration_seconds: u64,
    /// Remote location of the bytes
    pub url: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Lowercase hex SHA-256 of the content, verified when present
    #[serde(default)]
    pub sha256: Option<String>,
}

impl AssetInfo {
    pub fn new(id: impl Into<String>, url: impl Into<String>, size_bytes: u64) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            description: String::new(),
            language: String::new(),
            category: String::new(),
            size_bytes,
            duration_seconds: 0,
            url: url.into(),
            thumbnail: None,
            sha256: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_duration_seconds(mut self, seconds: u64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_sha256(mut self, checksum: impl Into<String>) -> Self {
        self.sha256 = Some(checksum.into());
        self
    }

    /// Asset IDs double as file names, so they are restricted to
    /// `[A-Za-z0-9._-]` and may not start with a dot.
    pub fn validate(&self) -> Result<()> {
        validate_asset_id(&self.id)?;
        if self.url.trim().is_empty() {
            return Err(MediaError::InvalidInput(format!(
                "Asset {} has no URL",
                self.id
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_asset_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(MediaError::InvalidInput(format!("Invalid asset ID: {:?}", id)))
    }
}

/// Metadata tracked for every cached asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub id: String,
    pub title: String,
    pub description: String,
    pub language: String,
    pub category: String,
    pub size_bytes: u64,
    pub duration_seconds: u64,
    pub downloaded_at: DateTime<Utc>,
    pub last_watched_at: Option<DateTime<Utc>>,
    pub watch_progress_percent: u8,
    /// Last playback position
    #[serde(default)]
    pub position_seconds: f64,
    pub watch_count: u32,
    pub completed: bool,
    /// Local file path, or the remote URL for remote-only entries
    pub local_ref: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub state: AssetState,
}

impl AssetMetadata {
    pub(crate) fn provisional(info: &AssetInfo, local_ref: String, now: DateTime<Utc>) -> Self {
        Self {
            id: info.id.clone(),
            title: info.title.clone(),
            description: info.description.clone(),
            language: info.language.clone(),
            category: info.category.clone(),
            size_bytes: info.size_bytes,
            duration_seconds: info.duration_seconds,
            downloaded_at: now,
            last_watched_at: None,
            watch_progress_percent: 0,
            position_seconds: 0.0,
            watch_count: 0,
            completed: false,
            local_ref,
            thumbnail: info.thumbnail.clone(),
            state: AssetState::Provisional,
        }
    }

    pub(crate) fn remote_only(info: &AssetInfo, now: DateTime<Utc>) -> Self {
        let mut meta = Self::provisional(info, info.url.clone(), now);
        meta.state = AssetState::RemoteOnly;
        meta
    }

    pub fn is_ready(&self) -> bool {
        self.state == AssetState::Ready
    }

    pub fn is_remote_only(&self) -> bool {
        self.state == AssetState::RemoteOnly
    }

    /// Ready or remote-only: visible to consumers.
    pub fn is_available(&self) -> bool {
        self.state.is_persistent()
    }

    pub(crate) fn mark_ready(&mut self, size_bytes: u64, now: DateTime<Utc>) {
        self.size_bytes = size_bytes;
        self.downloaded_at = now;
        self.state = AssetState::Ready;
    }

    /// Record playback progress. Returns `true` on the first crossing of the
    /// completion threshold.
    pub(crate) fn record_watch(
        &mut self,
        percent: u8,
        position_seconds: f64,
        now: DateTime<Utc>,
    ) -> bool {
        self.last_watched_at = Some(now);
        self.watch_progress_percent = percent;
        self.position_seconds = position_seconds;

        if percent >= COMPLETION_THRESHOLD_PERCENT && !self.completed {
            self.completed = true;
            self.watch_count += 1;
            return true;
        }
        false
    }

    /// Not yet watched to completion, or never counted as watched.
    /// Last watch, or the download time for assets never watched.
    pub fn last_used_at(&self) -> DateTime<Utc> {
        self.last_watched_at.unwrap_or(self.downloaded_at)
    }

    pub fn is_unwatched(&self) -> bool {
        !self.completed || self.watch_count == 0
    }
}

/// Ordering for [`AssetFilter`] results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Most recently watched or downloaded first
    #[default]
    Recent,
    /// Title, ascending
    Title,
}

/// Query over available assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFilter {
    pub language: Option<String>,
    pub category: Option<String>,
    pub completed: Option<bool>,
    pub sort: SortOrder,
}

impl AssetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn matches(&self, asset: &AssetMetadata) -> bool {
        asset.is_available()
            && self.language.as_ref().map_or(true, |l| &asset.language == l)
            && self.category.as_ref().map_or(true, |c| &asset.category == c)
            && self.completed.map_or(true, |c| asset.completed == c)
    }

    /// Filter and sort `assets`.
    pub fn apply<'a>(&self, assets: impl IntoIterator<Item = &'a AssetMetadata>) -> Vec<AssetMetadata> {
        let mut result: Vec<AssetMetadata> = assets
            .into_iter()
            .filter(|a| self.matches(a))
            .cloned()
            .collect();

        match self.sort {
            SortOrder::Recent => result.sort_by(|a, b| {
                b.last_used_at()
                    .cmp(&a.last_used_at())
                    .then_with(|| a.id.cmp(&b.id))
            }),
            SortOrder::Title => {
                result.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)))
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn asset(id: &str, title: &str, day: u32) -> AssetMetadata {
        let at = Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap();
        let info = AssetInfo::new(id, format!("https://cdn.test/{id}"), 10)
            .with_title(title)
            .with_language("en")
            .with_category("farming");
        let mut meta = AssetMetadata::provisional(&info, format!("/media/{id}"), at);
        meta.mark_ready(10, at);
        meta
    }

    #[test]
    fn test_state_string_round_trip() {
        for state in [
            AssetState::Provisional,
            AssetState::Downloading,
            AssetState::Ready,
            AssetState::RemoteOnly,
        ] {
            assert_eq!(state.as_str().parse::<AssetState>().unwrap(), state);
        }
        assert!("evicted".parse::<AssetState>().is_err());
    }

    #[test]
    fn test_watch_completion_is_counted_once() {
        let mut meta = asset("a1", "Soil", 1);
        let now = Utc::now();

        assert!(!meta.record_watch(50, 30.0, now));
        assert!(!meta.completed);
        assert!(meta.record_watch(95, 57.0, now));
        assert!(!meta.record_watch(97, 58.0, now));
        assert!(!meta.record_watch(20, 12.0, now));

        assert!(meta.completed);
        assert_eq!(meta.watch_count, 1);
        assert_eq!(meta.watch_progress_percent, 20);
    }

    #[test]
    fn test_asset_id_validation() {
        assert!(validate_asset_id("video-01_en.v2").is_ok());
        assert!(validate_asset_id("").is_err());
        assert!(validate_asset_id("../etc").is_err());
        assert!(validate_asset_id(".hidden").is_err());
        assert!(validate_asset_id("a b").is_err());
    }

    #[test]
    fn test_filter_and_sort() {
        let mut b = asset("b", "Irrigation", 2);
        b.language = "sw".to_string();
        let assets = vec![asset("a", "Soil", 1), b, asset("c", "Harvest", 3)];

        let recent = AssetFilter::new().apply(&assets);
        let ids: Vec<_> = recent.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        let english_by_title = AssetFilter::new()
            .language("en")
            .sort(SortOrder::Title)
            .apply(&assets);
        let ids: Vec<_> = english_by_title.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);

        assert!(AssetFilter::new().completed(true).apply(&assets).is_empty());
    }

    #[test]
    fn test_recent_sort_uses_last_watch() {
        let mut a = asset("a", "Soil", 1);
        a.record_watch(10, 30.0, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
        let assets = vec![a, asset("b", "Irrigation", 2), asset("c", "Harvest", 3)];

        let ids: Vec<_> = AssetFilter::new()
            .apply(&assets)
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }
}
