//! Storage statistics and download progress

use serde::{Deserialize, Serialize};

/// Snapshot of the storage budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Sum of `size_bytes` over Ready assets
    pub used_bytes: u64,

    /// Configured budget
    pub max_bytes: u64,

    /// `max_bytes - used_bytes`; negative after the budget was lowered
    pub available_bytes: i64,

    /// Number of Ready assets
    pub asset_count: usize,

    /// Number of remote-only entries (not counted in `used_bytes`)
    pub remote_only_count: usize,

    /// Usage as a percentage of the budget
    pub percent_used: f64,
}

impl StorageStats {
    pub fn new(used_bytes: u64, max_bytes: u64, asset_count: usize, remote_only_count: usize) -> Self {
        let percent_used = if max_bytes == 0 {
            0.0
        } else {
            (used_bytes as f64 / max_bytes as f64) * 100.0
        };

        Self {
            used_bytes,
            max_bytes,
            available_bytes: max_bytes as i64 - used_bytes as i64,
            asset_count,
            remote_only_count,
            percent_used,
        }
    }

    /// Returns true if the cache is near capacity (>90%).
    pub fn is_near_capacity(&self) -> bool {
        self.percent_used > 90.0
    }

    /// Returns true if the cache is full (>=100%).
    pub fn is_full(&self) -> bool {
        self.used_bytes >= self.max_bytes
    }

    /// Bytes that must be freed to get back under the budget.
    pub fn space_needed(&self) -> u64 {
        self.used_bytes.saturating_sub(self.max_bytes)
    }

    /// Returns average bytes per asset.
    pub fn average_asset_size(&self) -> u64 {
        if self.asset_count == 0 {
            0
        } else {
            self.used_bytes / self.asset_count as u64
        }
    }
}

/// Download progress information for a specific asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Asset identifier
    pub asset_id: String,

    /// Total size in bytes (advertised until the server reports it)
    pub total_bytes: u64,

    /// Bytes downloaded so far, including resumed bytes
    pub downloaded_bytes: u64,

    /// Download progress percentage (0-100)
    pub progress_percent: u8,

    /// Current download speed in bytes/second
    pub speed_bytes_per_sec: u64,

    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,

    /// Download started timestamp
    pub started_at: i64,

    /// Last update timestamp
    pub updated_at: i64,
}

impl DownloadProgress {
    /// Create new download progress tracker.
    pub fn new(asset_id: String, total_bytes: u64) -> Self {
        let now = chrono::Utc::now().timestamp();

        Self {
            asset_id,
            total_bytes,
            downloaded_bytes: 0,
            progress_percent: 0,
            speed_bytes_per_sec: 0,
            eta_seconds: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Progress of an asset that is already complete.
    pub fn finished(asset_id: String, total_bytes: u64) -> Self {
        let mut progress = Self::new(asset_id, total_bytes);
        progress.update(total_bytes);
        progress.progress_percent = 100;
        progress
    }

    /// Update progress with new downloaded bytes.
    pub fn update(&mut self, downloaded_bytes: u64) {
        let now = chrono::Utc::now().timestamp();
        let elapsed = (now - self.started_at).max(1) as u64;

        self.downloaded_bytes = downloaded_bytes;
        self.updated_at = now;

        if self.total_bytes > 0 {
            let percent = (downloaded_bytes as f64 / self.total_bytes as f64) * 100.0;
            self.progress_percent = percent.min(100.0) as u8;
        }

        self.speed_bytes_per_sec = downloaded_bytes / elapsed;

        if self.speed_bytes_per_sec > 0 {
            let remaining_bytes = self.total_bytes.saturating_sub(downloaded_bytes);
            self.eta_seconds = Some(remaining_bytes / self.speed_bytes_per_sec);
        } else {
            self.eta_seconds = None;
        }
    }

    /// Returns true if download is complete.
    pub fn is_complete(&self) -> bool {
        self.total_bytes > 0 && self.downloaded_bytes >= self.total_bytes
    }

    /// Format speed as human-readable string.
    pub fn speed_string(&self) -> String {
        format_bytes_per_sec(self.speed_bytes_per_sec)
    }

    /// Format ETA as human-readable string.
    pub fn eta_string(&self) -> String {
        match self.eta_seconds {
            Some(secs) => format_duration_seconds(secs),
            None => "calculating...".to_string(),
        }
    }
}

fn format_bytes_per_sec(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B/s", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB/s", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB/s", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB/s", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_duration_seconds(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_stats() {
        let stats = StorageStats::new(45, 50, 3, 1);
        assert_eq!(stats.available_bytes, 5);
        assert!((stats.percent_used - 90.0).abs() < f64::EPSILON);
        assert!(!stats.is_near_capacity());
        assert!(!stats.is_full());
        assert_eq!(stats.average_asset_size(), 15);
    }

    #[test]
    fn test_lowered_budget_goes_negative() {
        let stats = StorageStats::new(120, 100, 2, 0);
        assert_eq!(stats.available_bytes, -20);
        assert!(stats.is_full());
        assert_eq!(stats.space_needed(), 20);
    }

    #[test]
    fn test_zero_budget() {
        let stats = StorageStats::new(0, 0, 0, 0);
        assert_eq!(stats.percent_used, 0.0);
    }

    #[test]
    fn test_download_progress() {
        let mut progress = DownloadProgress::new("a1".to_string(), 10_000_000);

        assert_eq!(progress.progress_percent, 0);
        assert!(!progress.is_complete());

        progress.update(5_000_000);
        assert_eq!(progress.progress_percent, 50);
        assert!(progress.speed_bytes_per_sec > 0);
        assert!(!progress.is_complete());

        progress.update(10_000_000);
        assert_eq!(progress.progress_percent, 100);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_finished_progress() {
        let progress = DownloadProgress::finished("a1".to_string(), 0);
        assert_eq!(progress.progress_percent, 100);
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_bytes_per_sec(500), "500 B/s");
        assert_eq!(format_bytes_per_sec(1024), "1.0 KB/s");
        assert_eq!(format_bytes_per_sec(1024 * 1024), "1.0 MB/s");

        assert_eq!(format_duration_seconds(30), "30s");
        assert_eq!(format_duration_seconds(90), "1m 30s");
        assert_eq!(format_duration_seconds(3661), "1h 1m");
    }
}
