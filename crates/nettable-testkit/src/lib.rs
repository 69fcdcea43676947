//! # Nettable Testkit
//!
//! Shared test machinery for the nettable workspace: golden wire-format
//! vectors pinning the byte-level protocol contract, proptest generators
//! for protocol data, and connection fixtures (trivial handshakes,
//! collecting processors).

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    accept_handshake, collector, init_tracing, memory_pair, no_entry_type, reject_handshake,
};
pub use nettable_sync::RecordingNotifier;
pub use vectors::{wire_vectors, WireVector};
