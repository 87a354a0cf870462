//! Connectivity monitor.
//!
//! An explicit service object rather than process-wide state: each `FfiApp` (and each
//! test) owns its own monitor. The platform feeds it in two ways:
//! - a [`ConnectivityProbe`] queried once when the monitor initializes, and
//! - [`NetworkMonitor::report`] calls from the platform's reachability listener.
//!
//! Subscribers only hear about actual flips, in subscription order.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Platform-side reachability query. `None` means "unknown", which reads as online.
#[uniffi::export(callback_interface)]
pub trait ConnectivityProbe: Send + Sync + 'static {
    fn is_connected(&self) -> Option<bool>;
}

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct Inner {
    online: bool,
    initialized: bool,
    /// A report has landed; a probe answer still in flight must not overwrite it.
    reported: bool,
    shut_down: bool,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
}

#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<Mutex<Inner>>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                online: true,
                initialized: false,
                reported: false,
                shut_down: false,
                probe: None,
                listeners: Vec::new(),
                next_listener_id: 0,
            })),
        }
    }

    pub fn with_probe(probe: Arc<dyn ConnectivityProbe>) -> Self {
        let monitor = Self::new();
        monitor.inner.lock().probe = Some(probe);
        monitor
    }

    /// Seed the state from the probe. Returns `false` if already initialized.
    pub fn init(&self) -> bool {
        let probe = {
            let mut inner = self.inner.lock();
            if inner.initialized {
                return false;
            }
            inner.initialized = true;
            inner.probe.clone()
        };
        // Optimistic default: an unanswerable probe means online.
        let probed = probe.and_then(|p| p.is_connected()).unwrap_or(true);
        let mut inner = self.inner.lock();
        if !inner.reported {
            inner.online = probed;
        }
        tracing::debug!(online = inner.online, probed, "network monitor initialized");
        true
    }

    /// Replace the probe. An already-initialized monitor re-queries it right away.
    pub fn set_probe(&self, probe: Arc<dyn ConnectivityProbe>) {
        let initialized = {
            let mut inner = self.inner.lock();
            inner.probe = Some(probe.clone());
            inner.initialized
        };
        if initialized {
            self.report(probe.is_connected().unwrap_or(true));
        }
    }

    /// Current connectivity. Never blocks on the platform beyond the first-call probe.
    pub fn current_state(&self) -> bool {
        self.init();
        self.inner.lock().online
    }

    pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let mut inner = self.inner.lock();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, Arc::new(callback)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Event-source entry point. Notifies subscribers only if the state flipped.
    pub fn report(&self, online: bool) {
        let listeners: Vec<Listener> = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return;
            }
            // A report counts as an observation; a later init must not overwrite it.
            inner.initialized = true;
            inner.reported = true;
            if inner.online == online {
                return;
            }
            inner.online = online;
            inner.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        tracing::info!(online, "connectivity changed");
        // Call outside the lock so a listener may query or unsubscribe.
        for listener in listeners {
            listener(online);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Drop all subscribers and ignore further reports.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shut_down = true;
        inner.listeners.clear();
        inner.probe = None;
    }
}

/// Handle returned by [`NetworkMonitor::subscribe`]. Dropping it keeps the subscription.
pub struct Subscription {
    id: u64,
    inner: Weak<Mutex<Inner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe(Option<bool>, Arc<AtomicUsize>);

    impl ConnectivityProbe for FixedProbe {
        fn is_connected(&self) -> Option<bool> {
            self.1.fetch_add(1, Ordering::SeqCst);
            self.0
        }
    }

    #[test]
    fn defaults_to_online_without_probe() {
        let monitor = NetworkMonitor::new();
        assert!(monitor.current_state());
    }

    #[test]
    fn unanswerable_probe_reads_as_online() {
        let calls = Arc::new(AtomicUsize::new(0));
        let monitor = NetworkMonitor::with_probe(Arc::new(FixedProbe(None, calls.clone())));
        assert!(monitor.current_state());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn init_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let monitor =
            NetworkMonitor::with_probe(Arc::new(FixedProbe(Some(false), calls.clone())));
        assert!(monitor.init());
        assert!(!monitor.init());
        assert!(!monitor.current_state());
        assert!(!monitor.current_state());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn notifies_only_on_flips_in_subscription_order() {
        let monitor = NetworkMonitor::new();
        let log = Arc::new(Mutex::new(Vec::<(u8, bool)>::new()));
        let l1 = log.clone();
        let _a = monitor.subscribe(move |online| l1.lock().push((1, online)));
        let l2 = log.clone();
        let _b = monitor.subscribe(move |online| l2.lock().push((2, online)));

        monitor.report(true); // no flip from the optimistic default
        monitor.report(false);
        monitor.report(false);
        monitor.report(true);

        assert_eq!(
            *log.lock(),
            vec![(1, false), (2, false), (1, true), (2, true)]
        );
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let monitor = NetworkMonitor::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = monitor.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        monitor.report(false);
        sub.unsubscribe();
        monitor.report(true);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.subscriber_count(), 0);
    }

    #[test]
    fn independent_instances_do_not_share_state() {
        let a = NetworkMonitor::new();
        let b = NetworkMonitor::new();
        a.report(false);
        assert!(!a.current_state());
        assert!(b.current_state());
    }

    #[test]
    fn report_before_init_wins_over_probe() {
        let calls = Arc::new(AtomicUsize::new(0));
        let monitor = NetworkMonitor::with_probe(Arc::new(FixedProbe(Some(true), calls.clone())));
        monitor.report(false);
        assert!(!monitor.current_state());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    /// Reports from the platform listener while the first probe is still answering.
    struct ReportingProbe {
        monitor: Mutex<Option<NetworkMonitor>>,
    }

    impl ConnectivityProbe for ReportingProbe {
        fn is_connected(&self) -> Option<bool> {
            if let Some(monitor) = self.monitor.lock().take() {
                monitor.report(false);
            }
            Some(true)
        }
    }

    #[test]
    fn report_during_probe_is_not_overwritten() {
        let monitor = NetworkMonitor::new();
        let probe = Arc::new(ReportingProbe {
            monitor: Mutex::new(Some(monitor.clone())),
        });
        monitor.set_probe(probe);
        let log = Arc::new(Mutex::new(Vec::<bool>::new()));
        let l = log.clone();
        let _sub = monitor.subscribe(move |online| l.lock().push(online));

        assert!(monitor.init());
        assert!(!monitor.current_state());
        assert_eq!(*log.lock(), vec![false]);
    }

    #[test]
    fn shutdown_drops_subscribers_and_ignores_reports() {
        let monitor = NetworkMonitor::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = monitor.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        monitor.shutdown();
        monitor.report(false);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(monitor.current_state());
    }
}
