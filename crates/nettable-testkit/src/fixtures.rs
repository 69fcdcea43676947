//! Connection fixtures: canned handshakes and message sinks.

use std::sync::{Arc, Mutex};

use nettable_core::{EntryId, EntryType, Message, MessageKind};
use nettable_sync::transport::memory::{self, MemoryTransport};
use nettable_sync::{EntryTypeFn, HandshakeFn, ProcessIncomingFn};

/// Install a test-writer tracing subscriber. Safe to call from every
/// test; only the first call in a process wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Connected in-process transport pair.
pub fn memory_pair() -> (MemoryTransport, MemoryTransport) {
    memory::pair()
}

/// Handshake that succeeds immediately without exchanging anything.
pub fn accept_handshake() -> HandshakeFn {
    Box::new(|_, _, _| true)
}

/// Handshake that fails immediately; the connection dies before active.
pub fn reject_handshake() -> HandshakeFn {
    Box::new(|_, _, _| false)
}

/// Entry-type resolver that knows no entries.
pub fn no_entry_type() -> EntryTypeFn {
    Box::new(|_kind: MessageKind, _id: EntryId| -> Option<EntryType> { None })
}

/// Incoming-message processor that appends every message to a shared
/// vector, returned alongside it for assertions.
pub fn collector() -> (ProcessIncomingFn, Arc<Mutex<Vec<Message>>>) {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&sink);
    let processor: ProcessIncomingFn =
        Box::new(move |msg, _conn| writer.lock().unwrap().push(msg));
    (processor, sink)
}
