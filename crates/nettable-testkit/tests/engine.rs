//! Fixture-driven smoke tests for the connection engine.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nettable_sync::{Connection, ConnectionNotifier, ConnectionState, Transport};
use nettable_testkit::{
    accept_handshake, collector, init_tracing, memory_pair, no_entry_type, reject_handshake,
    wire_vectors, RecordingNotifier,
};

fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn test_collector_receives_golden_vector_traffic() {
    init_tracing();
    let (a, b) = memory_pair();
    let peer: Arc<dyn Transport> = Arc::new(b);
    let (processor, received) = collector();

    let conn = Connection::new(
        1,
        Arc::new(a),
        RecordingNotifier::new(),
        accept_handshake(),
        no_entry_type(),
        processor,
    );
    conn.start();
    assert!(wait_for(
        || conn.state() == ConnectionState::Active,
        Duration::from_secs(2)
    ));

    let vector = wire_vectors()
        .into_iter()
        .find(|v| v.name == "entry_update_bool_rev3")
        .unwrap();
    peer.send(&vector.bytes()).unwrap();

    assert!(wait_for(
        || !received.lock().unwrap().is_empty(),
        Duration::from_secs(2)
    ));
    assert_eq!(received.lock().unwrap()[0], (vector.message)());
    conn.stop();
}

#[test]
fn test_reject_handshake_kills_connection() {
    init_tracing();
    let (a, _b) = memory_pair();
    let notifier = RecordingNotifier::new();
    let conn = Connection::new(
        2,
        Arc::new(a),
        Arc::clone(&notifier) as Arc<dyn ConnectionNotifier>,
        reject_handshake(),
        no_entry_type(),
        Box::new(|_, _| {}),
    );
    conn.start();
    assert!(wait_for(
        || conn.state() == ConnectionState::Dead,
        Duration::from_secs(2)
    ));
    assert!(notifier.events().iter().all(|(connected, _)| !connected));
    conn.stop();
}
