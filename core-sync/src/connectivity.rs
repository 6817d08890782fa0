//! # Connectivity Monitor
//!
//! Tracks whether the device can currently reach the network and notifies
//! listeners on every online/offline transition.
//!
//! ## Overview
//!
//! The monitor prefers the platform signal exposed through
//! [`NetworkMonitor`]. When that signal is absent or errors, the monitor
//! enters a degraded mode: it assumes online, logs a single warning, and
//! relies on a periodic reachability check (an HTTP `HEAD` against the
//! configured check URL) instead.
//!
//! An `Indeterminate` reading from the platform keeps the previous state.
//!
//! ## Usage
//!
//! ```ignore
//! let monitor = ConnectivityMonitor::new(Some(network), Some(http), config, events);
//! let subscription = monitor.subscribe(|online| println!("online: {online}"));
//! monitor.start().await;
//!
//! // Later
//! subscription.unsubscribe();
//! monitor.shutdown().await;
//! ```

use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use bridge_traits::network::{NetworkChangeStream, NetworkMonitor, NetworkStatus};
use core_runtime::config::ConnectivityConfig;
use core_runtime::events::{ConnectivityEvent, CoreEvent, EventBus};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Callback invoked with the current online state.
pub type ConnectivityListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Work to run once when the device comes back online.
#[async_trait]
pub trait ReconnectHandler: Send + Sync {
    async fn on_reconnect(&self);
}

/// Handle returned by [`ConnectivityMonitor::subscribe`].
///
/// The listener is removed when the handle is dropped.
pub struct Subscription {
    id: u64,
    monitor: Weak<ConnectivityMonitor>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.upgrade() {
            monitor.listeners.lock().remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

pub struct ConnectivityMonitor {
    signal: Option<Arc<dyn NetworkMonitor>>,
    check_client: Option<Arc<dyn HttpClient>>,
    config: ConnectivityConfig,
    events: EventBus,
    online: AtomicBool,
    degraded: AtomicBool,
    degraded_warned: AtomicBool,
    listeners: Mutex<BTreeMap<u64, ConnectivityListener>>,
    next_listener_id: AtomicU64,
    // Held across a state change and its notifications so listeners observe
    // transitions in order. Reentrant so a listener may subscribe.
    transition_lock: ReentrantMutex<()>,
    poll_lock: tokio::sync::Mutex<()>,
    reconnect_handler: Mutex<Option<Weak<dyn ReconnectHandler>>>,
    shutdown: CancellationToken,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    /// Create a monitor. The initial state is online until the first poll.
    pub fn new(
        signal: Option<Arc<dyn NetworkMonitor>>,
        check_client: Option<Arc<dyn HttpClient>>,
        config: ConnectivityConfig,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            signal,
            check_client,
            config,
            events,
            online: AtomicBool::new(true),
            degraded: AtomicBool::new(false),
            degraded_warned: AtomicBool::new(false),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener_id: AtomicU64::new(1),
            transition_lock: ReentrantMutex::new(()),
            poll_lock: tokio::sync::Mutex::new(()),
            reconnect_handler: Mutex::new(None),
            shutdown: CancellationToken::new(),
            watcher: Mutex::new(None),
        })
    }

    /// Last known state.
    pub fn current_state(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether the platform signal is unusable and the monitor relies on
    /// probing.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Register a listener. It is invoked once immediately with the current
    /// state and then on every transition.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let listener: ConnectivityListener = Arc::new(listener);
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);

        let _transition = self.transition_lock.lock();
        self.listeners.lock().insert(id, Arc::clone(&listener));
        listener(self.current_state());

        Subscription {
            id,
            monitor: Arc::downgrade(self),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Register the work to run on an offline to online transition.
    pub fn set_reconnect_handler(&self, handler: Weak<dyn ReconnectHandler>) {
        *self.reconnect_handler.lock() = Some(handler);
    }

    /// Sample connectivity once and apply the result.
    ///
    /// Returns the state after the poll. On an offline to online transition
    /// the reconnect handler is awaited before returning.
    pub async fn poll(&self) -> bool {
        let observed = {
            let _guard = self.poll_lock.lock().await;
            self.observe().await
        };
        self.update(observed).await
    }

    /// Spawn the background watcher.
    ///
    /// Follows the platform change stream when one is available and falls
    /// back to polling every `check_interval` otherwise.
    pub async fn start(self: &Arc<Self>) {
        if self.watcher.lock().is_some() {
            return;
        }

        self.poll().await;

        let stream = match &self.signal {
            Some(signal) => match signal.subscribe_changes().await {
                Ok(stream) => Some(stream),
                Err(e) => {
                    debug!(error = %e, "Network change stream unavailable, polling instead");
                    None
                }
            },
            None => None,
        };

        let weak = Arc::downgrade(self);
        let token = self.shutdown.child_token();
        let interval = self.config.check_interval;
        let handle = tokio::spawn(run_watcher(weak, stream, token, interval));

        *self.watcher.lock() = Some(handle);
        info!("Connectivity monitor started");
    }

    /// Stop the background watcher and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.watcher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
            info!("Connectivity monitor stopped");
        }
    }

    async fn observe(&self) -> Option<bool> {
        let Some(signal) = &self.signal else {
            self.enter_degraded("no platform network signal available");
            return self.check_reachability().await;
        };

        match signal.get_network_info().await {
            Ok(info) => {
                self.degraded.store(false, Ordering::SeqCst);
                match info.status {
                    NetworkStatus::Connected => Some(true),
                    NetworkStatus::Disconnected => Some(false),
                    NetworkStatus::Indeterminate => None,
                }
            }
            Err(e) => {
                self.enter_degraded(&format!("platform network signal failed: {}", e));
                self.check_reachability().await
            }
        }
    }

    async fn check_reachability(&self) -> Option<bool> {
        let (Some(client), Some(url)) = (&self.check_client, &self.config.check_url) else {
            return Some(true);
        };

        let request = HttpRequest::new(HttpMethod::Head, url.as_str())
            .timeout(self.config.check_timeout);

        match client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await
        {
            Ok(_) | Err(BridgeError::HttpStatus { .. }) => Some(true),
            Err(e) => {
                debug!(error = %e, "Reachability check failed");
                Some(false)
            }
        }
    }

    fn enter_degraded(&self, reason: &str) {
        self.degraded.store(true, Ordering::SeqCst);
        if !self.degraded_warned.swap(true, Ordering::SeqCst) {
            warn!(
                reason,
                "Connectivity signal unavailable, assuming online and probing periodically"
            );
            let _ = self
                .events
                .emit(CoreEvent::Connectivity(ConnectivityEvent::Degraded {
                    reason: reason.to_string(),
                }));
        }
    }

    async fn update(&self, observed: Option<bool>) -> bool {
        let Some(online) = observed else {
            return self.current_state();
        };

        let came_online = {
            let _transition = self.transition_lock.lock();
            let previous = self.online.swap(online, Ordering::SeqCst);
            if previous == online {
                return online;
            }

            info!(online, "Connectivity changed");
            let event = if online {
                ConnectivityEvent::Online
            } else {
                ConnectivityEvent::Offline
            };
            let _ = self.events.emit(CoreEvent::Connectivity(event));

            let listeners: Vec<ConnectivityListener> =
                self.listeners.lock().values().cloned().collect();
            for listener in listeners {
                listener(online);
            }
            online
        };

        if came_online {
            let handler = self
                .reconnect_handler
                .lock()
                .as_ref()
                .and_then(|weak| weak.upgrade());
            if let Some(handler) = handler {
                handler.on_reconnect().await;
            }
        }

        online
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.current_state())
            .field("degraded", &self.is_degraded())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

async fn run_watcher(
    monitor: Weak<ConnectivityMonitor>,
    mut stream: Option<Box<dyn NetworkChangeStream>>,
    token: CancellationToken,
    interval: std::time::Duration,
) {
    if let Some(changes) = stream.as_mut() {
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return,
                next = changes.next() => next,
            };
            let Some(info) = next else {
                debug!("Network change stream ended, switching to polling");
                break;
            };
            let Some(monitor) = monitor.upgrade() else {
                return;
            };
            let observed = match info.status {
                NetworkStatus::Connected => Some(true),
                NetworkStatus::Disconnected => Some(false),
                NetworkStatus::Indeterminate => None,
            };
            tokio::select! {
                _ = token.cancelled() => return,
                _ = monitor.update(observed) => {}
            }
        }
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let Some(monitor) = monitor.upgrade() else {
            return;
        };
        tokio::select! {
            _ = token.cancelled() => return,
            _ = monitor.poll() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::network::NetworkInfo;
    use bridge_traits::network::NetworkType;

    struct FixedSignal(NetworkStatus);

    #[async_trait]
    impl NetworkMonitor for FixedSignal {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
            Ok(NetworkInfo {
                status: self.0,
                network_type: Some(NetworkType::WiFi),
                is_metered: false,
                is_expensive: false,
            })
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
            Err(BridgeError::NotAvailable("no change stream".to_string()))
        }
    }

    #[tokio::test]
    async fn test_subscribe_reports_current_state_immediately() {
        let monitor = ConnectivityMonitor::new(
            Some(Arc::new(FixedSignal(NetworkStatus::Disconnected))),
            None,
            ConnectivityConfig::default(),
            EventBus::new(8),
        );
        monitor.poll().await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = monitor.subscribe(move |online| sink.lock().push(online));

        assert_eq!(*seen.lock(), vec![false]);
    }

    #[tokio::test]
    async fn test_indeterminate_keeps_previous_state() {
        let monitor = ConnectivityMonitor::new(
            Some(Arc::new(FixedSignal(NetworkStatus::Indeterminate))),
            None,
            ConnectivityConfig::default(),
            EventBus::new(8),
        );

        assert!(monitor.poll().await);
        assert!(!monitor.is_degraded());
    }

    #[tokio::test]
    async fn test_dropping_subscription_removes_listener() {
        let monitor =
            ConnectivityMonitor::new(None, None, ConnectivityConfig::default(), EventBus::new(8));

        let sub = monitor.subscribe(|_| {});
        assert_eq!(monitor.listener_count(), 1);
        drop(sub);
        assert_eq!(monitor.listener_count(), 0);
    }
}
