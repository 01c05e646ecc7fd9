//! Reachability state and transition stream.
//!
//! The monitor itself is a seam: the embedder (an OS reachability probe,
//! a socket health check, a test) drives [`ConnectivityMonitor`], and
//! upload coordination consumes the cheap-clone [`ConnectivityWatch`]
//! handle. Current reachability is checked synchronously; transitions
//! are observed through a `watch` subscription.

use tokio::sync::watch;
use tracing::info;

/// Network reachability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connected,
    NotConnected,
}

/// Publisher side of the reachability state.
///
/// Dropping the monitor ends the transition stream; watchers keep
/// reporting the last known state.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state_tx: watch::Sender<ConnState>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial state.
    pub fn new(initial: ConnState) -> Self {
        let (state_tx, _) = watch::channel(initial);
        Self { state_tx }
    }

    /// Returns a consumer handle.
    pub fn watch(&self) -> ConnectivityWatch {
        ConnectivityWatch {
            rx: self.state_tx.subscribe(),
        }
    }

    /// Publishes a new reachability state. No-op if unchanged.
    pub fn set_state(&self, state: ConnState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            info!(?state, "connectivity changed");
            *current = state;
            true
        });
    }

    /// Convenience wrapper around [`set_state`](Self::set_state).
    pub fn set_connected(&self, connected: bool) {
        self.set_state(if connected {
            ConnState::Connected
        } else {
            ConnState::NotConnected
        });
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnState::Connected)
    }
}

/// Consumer handle for reachability.
#[derive(Debug, Clone)]
pub struct ConnectivityWatch {
    rx: watch::Receiver<ConnState>,
}

impl ConnectivityWatch {
    /// Current reachability, checked synchronously.
    pub fn is_connected(&self) -> bool {
        *self.rx.borrow() == ConnState::Connected
    }

    /// Current state.
    pub fn state(&self) -> ConnState {
        *self.rx.borrow()
    }

    /// Subscribes to state transitions.
    ///
    /// The returned receiver yields a change notification per published
    /// transition and errors out once the monitor is dropped.
    pub fn subscribe(&self) -> watch::Receiver<ConnState> {
        self.rx.clone()
    }
}
