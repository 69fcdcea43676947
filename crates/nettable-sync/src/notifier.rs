//! Notification contract for connection lifecycle transitions.

use std::sync::{Arc, Mutex};

/// Snapshot of a connection's identity and health, delivered with every
/// notifier callback and queryable at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Peer self-identification from the handshake; empty until then.
    pub remote_id: String,
    /// Peer network address.
    pub remote_ip: String,
    /// Peer port.
    pub remote_port: u16,
    /// Microseconds since the Unix epoch of the last decoded incoming
    /// message; zero if nothing has arrived yet.
    pub last_update: u64,
    /// Negotiated protocol revision.
    pub proto_rev: u16,
}

/// Callback sink for connection-established / connection-lost events.
///
/// Called at most once per direction per connection lifetime: once with
/// `connected = true` on the first transition to active, once with
/// `connected = false` on the first transition to dead.
pub trait ConnectionNotifier: Send + Sync {
    fn notify_connection(&self, connected: bool, info: ConnectionInfo);
}

/// Notifier that records every event; used by tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(bool, ConnectionInfo)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Events observed so far, in delivery order.
    pub fn events(&self) -> Vec<(bool, ConnectionInfo)> {
        self.events.lock().unwrap().clone()
    }
}

impl ConnectionNotifier for RecordingNotifier {
    fn notify_connection(&self, connected: bool, info: ConnectionInfo) {
        self.events.lock().unwrap().push((connected, info));
    }
}
