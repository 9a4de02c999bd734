// TCP connectivity probe
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use syncq_core::application::ShutdownToken;
use syncq_core::port::{ConnectivityMonitor, ConnectivitySignal, ConnectivityWatch};

/// Shortest delay allowed between two checks
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// Periodically checks reachability by opening TCP connections
///
/// The network counts as online when any target accepts a connection
/// within `connect_timeout`. Transitions are published through a
/// `ConnectivitySignal`, so the probe itself is a `ConnectivityMonitor`.
/// With no targets configured the probe always reports online.
pub struct TcpConnectivityProbe {
    targets: Vec<String>,
    probe_interval: Duration,
    connect_timeout: Duration,
    signal: Arc<ConnectivitySignal>,
}

impl TcpConnectivityProbe {
    /// Create a probe; it reports offline until the first check
    ///
    /// # Arguments
    /// * `targets` - `host:port` pairs (e.g. `1.1.1.1:443`)
    /// * `probe_interval` - Delay between checks (at least `MIN_PROBE_INTERVAL`)
    /// * `connect_timeout` - Per-target connect timeout
    pub fn new(targets: Vec<String>, probe_interval: Duration, connect_timeout: Duration) -> Self {
        Self {
            targets,
            probe_interval: probe_interval.max(MIN_PROBE_INTERVAL),
            connect_timeout,
            signal: Arc::new(ConnectivitySignal::new(false)),
        }
    }

    /// Try every target in order, stopping at the first that connects
    pub async fn probe_once(&self) -> bool {
        if self.targets.is_empty() {
            return true;
        }

        for target in &self.targets {
            match timeout(self.connect_timeout, TcpStream::connect(target.as_str())).await {
                Ok(Ok(_stream)) => {
                    debug!(target = %target, "Connectivity probe succeeded");
                    return true;
                }
                Ok(Err(e)) => {
                    debug!(target = %target, error = %e, "Connectivity probe failed");
                }
                Err(_) => {
                    debug!(target = %target, "Connectivity probe timed out");
                }
            }
        }
        false
    }

    /// Probe and publish the result; returns the new state
    pub async fn check(&self) -> bool {
        let online = self.probe_once().await;
        if self.signal.set_online(online) {
            if online {
                info!("Network reachable, connectivity restored");
            } else {
                warn!(targets = ?self.targets, "Network unreachable, going offline");
            }
        }
        online
    }

    /// Probe every `probe_interval` until `shutdown` fires
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(
            targets = ?self.targets,
            interval_ms = self.probe_interval.as_millis() as u64,
            "Connectivity probe started"
        );

        let mut tick = interval(self.probe_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Connectivity probe stopped");
                    break;
                }
                _ = tick.tick() => {
                    self.check().await;
                }
            }
        }
    }
}

impl ConnectivityMonitor for TcpConnectivityProbe {
    fn is_online(&self) -> bool {
        self.signal.is_online()
    }

    fn watch(&self) -> ConnectivityWatch {
        self.signal.watch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncq_core::application::shutdown_channel;
    use tokio::net::TcpListener;

    fn probe(targets: Vec<String>) -> TcpConnectivityProbe {
        TcpConnectivityProbe::new(
            targets,
            Duration::from_millis(20),
            Duration::from_millis(200),
        )
    }

    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[tokio::test]
    async fn test_online_when_any_target_accepts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().to_string();

        let probe = probe(vec![closed_port().await, open]);
        assert!(!probe.is_online());
        assert!(probe.check().await);
        assert!(probe.is_online());
    }

    #[tokio::test]
    async fn test_offline_when_no_target_accepts() {
        let probe = probe(vec![closed_port().await]);
        assert!(!probe.check().await);
        assert!(!probe.is_online());
    }

    #[tokio::test]
    async fn test_no_targets_means_online() {
        let probe = probe(Vec::new());
        assert!(probe.check().await);
    }

    #[tokio::test]
    async fn test_run_publishes_restored_transition() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        let probe = Arc::new(probe(vec![target]));
        let mut watch = probe.watch();

        let (tx, rx) = shutdown_channel();
        let runner = {
            let probe = probe.clone();
            tokio::spawn(async move { probe.run(rx).await })
        };

        let restored = tokio::time::timeout(Duration::from_secs(2), watch.restored())
            .await
            .expect("probe should publish online");
        assert!(restored);

        tx.shutdown();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let probe = Arc::new(TcpConnectivityProbe::new(
            Vec::new(),
            Duration::ZERO,
            Duration::from_millis(200),
        ));
        let mut watch = probe.watch();

        let (tx, rx) = shutdown_channel();
        let runner = {
            let probe = probe.clone();
            tokio::spawn(async move { probe.run(rx).await })
        };

        let restored = tokio::time::timeout(Duration::from_secs(2), watch.restored())
            .await
            .expect("probe should keep running");
        assert!(restored);

        tx.shutdown();
        let joined = runner.await;
        assert!(joined.is_ok(), "probe task panicked");
    }
}
