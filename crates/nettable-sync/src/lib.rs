//! # Nettable Sync
//!
//! The per-connection engine of the nettable protocol: it negotiates a
//! handshake over a byte stream, coalesces redundant outgoing mutations
//! before they hit the wire, and pumps messages through dedicated reader
//! and writer threads until the connection dies.
//!
//! ## Architecture
//!
//! ```text
//! table layer ── queue_outgoing ──> OutgoingBuffer (merge/coalesce)
//!                post_outgoing ──────────┐
//!                                        v
//!                                  TransmitQueue ── writer thread ── transport send
//!                                                   reader thread ── transport read
//!                                                        │
//!                            process-incoming callback <─┘
//! ```
//!
//! ## Key Properties
//!
//! - **Bounded bandwidth**: at most one pending assign/update and one
//!   pending flags-update per entry between flushes; one transport write
//!   per flushed batch.
//! - **Ordering**: merging changes the content of a pending slot, never
//!   its position relative to other entries.
//! - **Bounded teardown**: [`Connection::stop`] waits at most ~200 ms per
//!   worker thread, then detaches rather than blocking forever.
//!
//! Errors inside the worker threads never cross the thread boundary; the
//! only externally observable failure signals are the notifier's
//! disconnected callback and the connection's terminal state.

pub mod connection;
pub mod notifier;
pub mod outgoing;
pub mod queue;
pub mod state;
pub mod transport;

pub use connection::{
    Connection, ConnectionConfig, EntryTypeFn, HandshakeFn, ProcessIncomingFn,
};
pub use notifier::{ConnectionInfo, ConnectionNotifier, RecordingNotifier};
pub use outgoing::OutgoingBuffer;
pub use queue::{Batch, TransmitQueue};
pub use state::{transition, ConnectionEvent, ConnectionState};
pub use transport::{memory, TcpTransport, Transport, TransportReader};
