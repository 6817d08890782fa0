//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_CHECK_ADDR: &str = "8.8.8.8:53";

/// Desktop network monitor implementation
///
/// Reports connectivity by opening a TCP connection to a well-known
/// endpoint. Platform APIs (netlink, SystemConfiguration, WinAPI) would give
/// richer information but need extra dependencies.
pub struct DesktopNetworkMonitor {
    check_addr: String,
    check_timeout: Duration,
    poll_interval: Duration,
    cached_info: Arc<Mutex<Option<NetworkInfo>>>,
}

impl DesktopNetworkMonitor {
    /// Create a new network monitor
    pub fn new() -> Self {
        Self {
            check_addr: DEFAULT_CHECK_ADDR.to_string(),
            check_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
            cached_info: Arc::new(Mutex::new(None)),
        }
    }

    /// Check a different `host:port` for reachability
    pub fn with_check_addr(mut self, addr: impl Into<String>) -> Self {
        self.check_addr = addr.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Last observed network info, if any check has run.
    pub async fn cached_info(&self) -> Option<NetworkInfo> {
        self.cached_info.lock().await.clone()
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            self.check_timeout,
            tokio::net::TcpStream::connect(self.check_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) => NetworkStatus::Disconnected,
            Err(_) => NetworkStatus::Disconnected,
        }
    }

    fn duplicate(&self) -> Self {
        Self {
            check_addr: self.check_addr.clone(),
            check_timeout: self.check_timeout,
            poll_interval: self.poll_interval,
            cached_info: Arc::clone(&self.cached_info),
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;

        let info = NetworkInfo {
            status,
            // Desktop can't tell Ethernet from WiFi without platform APIs
            network_type: if status == NetworkStatus::Connected {
                Some(NetworkType::Other)
            } else {
                None
            },
            is_metered: false,
            is_expensive: false,
        };

        *self.cached_info.lock().await = Some(info.clone());
        debug!(status = ?status, target = %self.check_addr, "Network info updated");

        Ok(info)
    }

    async fn is_metered(&self) -> bool {
        false
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: self.duplicate(),
            last_status: None,
        }))
    }
}

/// Network change stream that polls for changes
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            tokio::time::sleep(self.monitor.poll_interval).await;

            if let Ok(info) = self.monitor.get_network_info().await {
                if self.last_status.as_ref() != Some(&info.status) {
                    self.last_status = Some(info.status);
                    return Some(info);
                }
            }
        }
    }
}
