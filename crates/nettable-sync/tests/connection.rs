//! End-to-end tests for the connection engine over the in-memory
//! transport, with a hand-driven peer on the far endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use nettable_core::{
    EntryId, EntryType, Message, MessageKind, SeqNum, Value, WireDecoder, WireEncoder, PROTO_REV_3,
};
use nettable_sync::{
    memory, Connection, ConnectionConfig, ConnectionNotifier, ConnectionState, RecordingNotifier,
    Transport, TransportReader,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

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

/// Handshake that announces itself and waits for the peer's hello-done.
fn client_handshake() -> nettable_sync::HandshakeFn {
    Box::new(|conn, read_one, send| {
        send(vec![Message::ClientHello {
            proto_rev: conn.proto_rev(),
            identity: "test-client".to_owned(),
        }]);
        loop {
            match read_one() {
                Some(Message::ServerHello { identity, .. }) => conn.set_remote_id(&identity),
                Some(Message::ServerHelloDone) => {
                    send(vec![Message::ClientHelloDone]);
                    return true;
                }
                Some(_) => continue,
                None => return false,
            }
        }
    })
}

fn no_entry_type(_kind: MessageKind, _id: EntryId) -> Option<EntryType> {
    None
}

/// Drive the coordinator half of the handshake on the raw endpoint.
fn run_server_side(peer: Arc<dyn Transport>) {
    let mut dec = WireDecoder::new(TransportReader(Arc::clone(&peer)), PROTO_REV_3);
    let hello = dec.read_message(&no_entry_type).unwrap().unwrap();
    assert_eq!(hello.kind(), MessageKind::ClientHello);

    let mut enc = WireEncoder::new(PROTO_REV_3);
    enc.write_message(&Message::ServerHello {
        flags: 0,
        identity: "test-server".to_owned(),
    })
    .unwrap();
    enc.write_message(&Message::ServerHelloDone).unwrap();
    peer.send(enc.data()).unwrap();

    let done = dec.read_message(&no_entry_type).unwrap().unwrap();
    assert_eq!(done.kind(), MessageKind::ClientHelloDone);
}

#[test]
fn test_handshake_reaches_active_and_close_reaches_dead() {
    init_logging();
    let (a, b) = memory::pair();
    let peer: Arc<dyn Transport> = Arc::new(b);
    let notifier = RecordingNotifier::new();

    let conn = Connection::new(
        1,
        Arc::new(a),
        Arc::clone(&notifier) as Arc<dyn ConnectionNotifier>,
        client_handshake(),
        Box::new(no_entry_type),
        Box::new(|_, _| {}),
    );
    conn.start();

    let server = {
        let peer = Arc::clone(&peer);
        thread::spawn(move || run_server_side(peer))
    };
    server.join().unwrap();

    assert!(wait_for(
        || conn.state() == ConnectionState::Active,
        Duration::from_secs(2)
    ));
    assert_eq!(conn.remote_id(), "test-server");

    // peer hangs up; the engine must notice and die
    peer.close();
    assert!(wait_for(
        || conn.state() == ConnectionState::Dead,
        Duration::from_secs(2)
    ));

    let events: Vec<bool> = notifier.events().iter().map(|(c, _)| *c).collect();
    assert_eq!(events, vec![true, false]);
    conn.stop();
}

#[test]
fn test_incoming_messages_reach_processor_and_stamp_last_update() {
    init_logging();
    let (a, b) = memory::pair();
    let peer: Arc<dyn Transport> = Arc::new(b);
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);

    let conn = Connection::new(
        2,
        Arc::new(a),
        RecordingNotifier::new(),
        client_handshake(),
        Box::new(no_entry_type),
        Box::new(move |msg, _conn| sink.lock().unwrap().push(msg)),
    );
    conn.start();
    run_server_side(Arc::clone(&peer));
    assert!(wait_for(
        || conn.state() == ConnectionState::Active,
        Duration::from_secs(2)
    ));
    assert_eq!(conn.last_update(), 0);

    let update = Message::EntryUpdate {
        id: EntryId(3),
        seq_num: SeqNum(1),
        value: Value::String("hi".to_owned()),
    };
    let mut enc = WireEncoder::new(PROTO_REV_3);
    enc.write_message(&update).unwrap();
    peer.send(enc.data()).unwrap();

    assert!(wait_for(
        || !received.lock().unwrap().is_empty(),
        Duration::from_secs(2)
    ));
    assert_eq!(received.lock().unwrap().as_slice(), &[update]);
    assert!(conn.last_update() > 0);
    conn.stop();
}

#[test]
fn test_flushed_batch_arrives_as_one_write() {
    init_logging();
    let (a, b) = memory::pair();
    let peer: Arc<dyn Transport> = Arc::new(b);

    let conn = Connection::new(
        3,
        Arc::new(a),
        RecordingNotifier::new(),
        client_handshake(),
        Box::new(no_entry_type),
        Box::new(|_, _| {}),
    );
    conn.start();
    run_server_side(Arc::clone(&peer));
    assert!(wait_for(
        || conn.state() == ConnectionState::Active,
        Duration::from_secs(2)
    ));

    // three updates to one id merge down to the last one
    for (seq, v) in [(1, 1.0), (2, 2.0), (3, 3.0)] {
        conn.queue_outgoing(Message::EntryUpdate {
            id: EntryId(9),
            seq_num: SeqNum(seq),
            value: Value::Double(v),
        });
    }
    conn.post_outgoing(false);

    let mut dec = WireDecoder::new(TransportReader(Arc::clone(&peer)), PROTO_REV_3);
    let msg = dec.read_message(&no_entry_type).unwrap().unwrap();
    assert_eq!(
        msg,
        Message::EntryUpdate {
            id: EntryId(9),
            seq_num: SeqNum(3),
            value: Value::Double(3.0),
        }
    );
    conn.stop();
}

#[test]
fn test_failed_handshake_dies_without_connecting() {
    init_logging();
    let (a, _b) = memory::pair();
    let notifier = RecordingNotifier::new();
    let conn = Connection::new(
        4,
        Arc::new(a),
        Arc::clone(&notifier) as Arc<dyn ConnectionNotifier>,
        Box::new(|_, _, _| false),
        Box::new(no_entry_type),
        Box::new(|_, _| {}),
    );
    conn.start();
    assert!(wait_for(
        || conn.state() == ConnectionState::Dead,
        Duration::from_secs(2)
    ));
    let events: Vec<bool> = notifier.events().iter().map(|(c, _)| *c).collect();
    assert_eq!(events, vec![false]);
    conn.stop();
}

#[test]
fn test_stop_is_bounded_on_wedged_transport() {
    init_logging();
    let grace = Duration::from_millis(100);
    let conn = Connection::with_config(
        5,
        Arc::new(memory::WedgedTransport::new()),
        RecordingNotifier::new(),
        // parks in read_one forever; close() on the wedged transport is
        // a no-op, so only the detach fallback lets stop() return
        Box::new(|_, read_one, _| read_one().is_some()),
        Box::new(no_entry_type),
        Box::new(|_, _| {}),
        ConnectionConfig {
            shutdown_grace: grace,
            ..ConnectionConfig::default()
        },
    );
    conn.start();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    conn.stop();
    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_secs(1),
        "stop took {elapsed:?}, expected roughly 2x the {grace:?} grace"
    );
    assert_eq!(conn.state(), ConnectionState::Dead);
}

#[test]
fn test_stop_and_start_are_idempotent() {
    init_logging();
    let (a, _b) = memory::pair();
    let conn = Connection::new(
        6,
        Arc::new(a),
        RecordingNotifier::new(),
        Box::new(|_, _, _| true),
        Box::new(no_entry_type),
        Box::new(|_, _| {}),
    );
    conn.start();
    conn.start();
    conn.stop();
    conn.stop();
    assert_eq!(conn.state(), ConnectionState::Dead);
}

#[test]
fn test_concurrent_producers_lose_and_duplicate_nothing() {
    const PRODUCERS: u16 = 4;
    const PER_PRODUCER: u16 = 100;
    let expected = usize::from(PRODUCERS) * usize::from(PER_PRODUCER);

    init_logging();
    let (a, b) = memory::pair();
    let peer: Arc<dyn Transport> = Arc::new(b);
    let conn = Connection::new(
        7,
        Arc::new(a),
        RecordingNotifier::new(),
        Box::new(|_, _, _| true),
        Box::new(no_entry_type),
        Box::new(|_, _| {}),
    );
    conn.start();
    assert!(wait_for(
        || conn.state() == ConnectionState::Active,
        Duration::from_secs(2)
    ));

    // the peer counts distinct ids seen on the wire
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = {
        let peer = Arc::clone(&peer);
        let seen = Arc::clone(&seen);
        thread::spawn(move || {
            let mut ids = std::collections::HashSet::new();
            let mut dec = WireDecoder::new(TransportReader(peer), PROTO_REV_3);
            while let Ok(Some(msg)) = dec.read_message(&no_entry_type) {
                if let Some(id) = msg.entry_id() {
                    // duplicates on the wire would be a merge-buffer bug
                    assert!(ids.insert(id), "id {id} delivered twice");
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
    };

    thread::scope(|scope| {
        for p in 0..PRODUCERS {
            let conn = Arc::clone(&conn);
            scope.spawn(move || {
                for i in 0..PER_PRODUCER {
                    // distinct ids so no merge can legally drop anything
                    conn.queue_outgoing(Message::EntryUpdate {
                        id: EntryId(p * 1000 + i),
                        seq_num: SeqNum(1),
                        value: Value::Boolean(true),
                    });
                }
            });
        }
        let conn = Arc::clone(&conn);
        scope.spawn(move || {
            for _ in 0..50 {
                conn.post_outgoing(false);
                thread::sleep(Duration::from_millis(1));
            }
        });
    });

    // final flush for anything queued after the flusher finished
    conn.post_outgoing(false);
    assert!(wait_for(
        || seen.load(Ordering::SeqCst) == expected,
        Duration::from_secs(5)
    ));
    conn.stop();
    counter.join().unwrap();
}
