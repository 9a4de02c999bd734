// Connectivity Port (online/offline notifications)

use tokio::sync::watch;

/// Source of network reachability for the queue
///
/// Implementations: `ConnectivitySignal` (manually driven, also used as the
/// publishing half by probes), `TcpConnectivityProbe` in infra-system.
pub trait ConnectivityMonitor: Send + Sync {
    /// Current reachability
    fn is_online(&self) -> bool;

    /// Subscribe to reachability changes
    fn watch(&self) -> ConnectivityWatch;
}

/// Receiving half of a connectivity subscription
#[derive(Clone)]
pub struct ConnectivityWatch {
    rx: watch::Receiver<bool>,
    last_seen: bool,
}

impl ConnectivityWatch {
    fn new(mut rx: watch::Receiver<bool>) -> Self {
        let last_seen = *rx.borrow_and_update();
        Self { rx, last_seen }
    }

    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the next offline -> online transition
    ///
    /// Returns false once the publishing side is gone.
    pub async fn restored(&mut self) -> bool {
        loop {
            if self.rx.changed().await.is_err() {
                return false;
            }
            let online = *self.rx.borrow_and_update();
            let was_online = std::mem::replace(&mut self.last_seen, online);
            if online && !was_online {
                return true;
            }
        }
    }
}

/// Publishing half of the connectivity state
pub struct ConnectivitySignal {
    tx: watch::Sender<bool>,
}

impl ConnectivitySignal {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Publish reachability; returns true if the state actually changed
    pub fn set_online(&self, online: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }
}

impl ConnectivityMonitor for ConnectivitySignal {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn watch(&self) -> ConnectivityWatch {
        ConnectivityWatch::new(self.tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_set_online_reports_changes_only() {
        let signal = ConnectivitySignal::new(false);
        assert!(!signal.is_online());
        assert!(signal.set_online(true));
        assert!(!signal.set_online(true));
        assert!(signal.is_online());
    }

    #[tokio::test]
    async fn test_restored_fires_on_offline_to_online() {
        let signal = ConnectivitySignal::new(false);
        let mut watch = signal.watch();

        let waiter = tokio::spawn(async move { watch.restored().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.set_online(true);

        let restored = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(restored);
    }

    #[tokio::test]
    async fn test_restored_ignores_going_offline() {
        let signal = ConnectivitySignal::new(true);
        let mut watch = signal.watch();
        signal.set_online(false);

        let result = tokio::time::timeout(Duration::from_millis(50), watch.restored()).await;
        assert!(result.is_err(), "going offline must not count as restored");
    }

    #[tokio::test]
    async fn test_restored_returns_false_when_signal_dropped() {
        let signal = ConnectivitySignal::new(false);
        let mut watch = signal.watch();
        drop(signal);
        assert!(!watch.restored().await);
    }
}
