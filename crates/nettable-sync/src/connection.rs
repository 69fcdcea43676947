//! The per-connection engine: handshake, worker threads, lifecycle.
//!
//! Each connection owns exactly two long-lived threads. The reader runs
//! the handshake, then decodes incoming messages and hands them to the
//! injected processor; the writer drains the transmit queue and issues
//! one transport write per batch. The transport's blocking read and
//! blocking write must never serialize with each other (a stalled peer
//! must not block outgoing flushes), which is why the two pumps are
//! independent threads rather than one loop.
//!
//! Shutdown is symmetric: whichever side dies first forces the other to
//! unblock (the reader by closing the transport, the writer by an empty
//! terminator batch), and [`Connection::stop`] waits a bounded grace
//! period per thread before detaching it, so teardown never hangs on a
//! wedged transport.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, trace, warn};

use nettable_core::{
    EntryId, EntryType, Message, MessageKind, WireDecoder, WireEncoder, PROTO_REV_3,
};

use crate::notifier::{ConnectionInfo, ConnectionNotifier};
use crate::outgoing::OutgoingBuffer;
use crate::queue::TransmitQueue;
use crate::state::{transition, ConnectionEvent, ConnectionState};
use crate::transport::{Transport, TransportReader};

/// Handshake policy, supplied by the layer that owns the connection.
///
/// Runs once on the reader thread before the main loop. The first
/// closure reads one message at the currently negotiated revision
/// (`None` on error or end of stream); the second sends messages
/// directly into the transmit queue, bypassing the merge buffer.
/// Returning `false` is fatal to the connection.
pub type HandshakeFn = Box<
    dyn Fn(&Connection, &mut dyn FnMut() -> Option<Message>, &mut dyn FnMut(Vec<Message>)) -> bool
        + Send
        + Sync,
>;

/// Entry-type resolver for revision-2.0 updates, supplied by the table
/// layer that owns the entry values.
pub type EntryTypeFn = Box<dyn Fn(MessageKind, EntryId) -> Option<EntryType> + Send + Sync>;

/// Called synchronously on the reader thread for every decoded message;
/// must not block the reader indefinitely.
pub type ProcessIncomingFn = Box<dyn Fn(Message, &Connection) + Send + Sync>;

/// Engine tunables. The defaults match the protocol's expectations; tests
/// shrink them to keep shutdown scenarios fast.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long `stop` waits for each worker thread before detaching it.
    pub shutdown_grace: Duration,
    /// Minimum interval between keep-alives on an idle connection.
    pub keepalive_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_millis(200),
            keepalive_interval: Duration::from_secs(1),
        }
    }
}

/// Merge buffer plus the flush-rate bookkeeping that guards keep-alives.
#[derive(Default)]
struct Pending {
    buffer: OutgoingBuffer,
    last_post: Option<Instant>,
}

#[derive(Default)]
struct ShutdownFlags {
    read_done: bool,
    write_done: bool,
}

#[derive(Default)]
struct ShutdownSignals {
    flags: Mutex<ShutdownFlags>,
    read_cv: Condvar,
    write_cv: Condvar,
}

#[derive(Default)]
struct WorkerHandles {
    read: Option<JoinHandle<()>>,
    write: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Copy)]
enum Worker {
    Read,
    Write,
}

/// One point-to-point table-sync connection over a byte stream.
pub struct Connection {
    uid: u32,
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn ConnectionNotifier>,
    handshake: HandshakeFn,
    entry_type: EntryTypeFn,
    process_incoming: ProcessIncomingFn,
    active: AtomicBool,
    proto_rev: AtomicU16,
    state: Mutex<ConnectionState>,
    /// Serializes notifier delivery so callbacks arrive in transition
    /// order; acquired before the state lock and held across the callback.
    notify_order: Mutex<()>,
    remote_id: Mutex<String>,
    /// Micros since the Unix epoch of the last decoded incoming message.
    last_update: AtomicU64,
    pending: Mutex<Pending>,
    outgoing: TransmitQueue,
    shutdown: ShutdownSignals,
    threads: Mutex<WorkerHandles>,
}

impl Connection {
    /// Create a connection over an open transport with default tunables.
    pub fn new(
        uid: u32,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn ConnectionNotifier>,
        handshake: HandshakeFn,
        entry_type: EntryTypeFn,
        process_incoming: ProcessIncomingFn,
    ) -> Arc<Self> {
        Self::with_config(
            uid,
            transport,
            notifier,
            handshake,
            entry_type,
            process_incoming,
            ConnectionConfig::default(),
        )
    }

    /// Create a connection with explicit tunables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_config(
        uid: u32,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn ConnectionNotifier>,
        handshake: HandshakeFn,
        entry_type: EntryTypeFn,
        process_incoming: ProcessIncomingFn,
        config: ConnectionConfig,
    ) -> Arc<Self> {
        // Nagle off; the engine already bundles messages per flush
        transport.set_no_delay();
        Arc::new(Self {
            uid,
            config,
            transport,
            notifier,
            handshake,
            entry_type,
            process_incoming,
            active: AtomicBool::new(false),
            proto_rev: AtomicU16::new(PROTO_REV_3),
            state: Mutex::new(ConnectionState::Created),
            notify_order: Mutex::new(()),
            remote_id: Mutex::new(String::new()),
            last_update: AtomicU64::new(0),
            pending: Mutex::new(Pending::default()),
            outgoing: TransmitQueue::new(),
            shutdown: ShutdownSignals::default(),
            threads: Mutex::new(WorkerHandles::default()),
        })
    }

    /// Spawn the worker threads. No-op if already active; setting the
    /// active flag before the state transition lets a racing [`stop`]
    /// observe the activity correctly.
    ///
    /// [`stop`]: Connection::stop
    pub fn start(self: &Arc<Self>) {
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(ConnectionState::Init);
        self.outgoing.clear();
        {
            let mut flags = self.shutdown.flags.lock().unwrap();
            flags.read_done = false;
            flags.write_done = false;
        }
        let mut threads = self.threads.lock().unwrap();
        threads.write = self.spawn_worker(Worker::Write);
        threads.read = self.spawn_worker(Worker::Read);
    }

    fn spawn_worker(self: &Arc<Self>, worker: Worker) -> Option<JoinHandle<()>> {
        let name = match worker {
            Worker::Read => format!("nettable-read-{}", self.uid),
            Worker::Write => format!("nettable-write-{}", self.uid),
        };
        let conn = Arc::clone(self);
        let result = thread::Builder::new().name(name).spawn(move || match worker {
            Worker::Read => conn.read_thread_main(),
            Worker::Write => conn.write_thread_main(),
        });
        match result {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(uid = self.uid, ?worker, error = %e, "failed to spawn worker thread");
                None
            }
        }
    }

    /// Tear the connection down: terminal state, transport closed, both
    /// worker threads woken and given a bounded grace period to exit,
    /// then detached if they fail to. Safe to call repeatedly and from
    /// `Drop`; never blocks longer than roughly twice the grace period.
    pub fn stop(&self) {
        debug!(uid = self.uid, "connection stopping");
        self.set_state(ConnectionState::Dead);
        self.active.store(false, Ordering::SeqCst);
        // closing the transport unblocks the reader
        self.transport.close();
        // an empty terminator batch unblocks the writer
        self.outgoing.push(Vec::new());
        let (read, write) = {
            let mut threads = self.threads.lock().unwrap();
            (threads.read.take(), threads.write.take())
        };
        if let Some(handle) = write {
            self.reap_worker(handle, Worker::Write);
        }
        if let Some(handle) = read {
            self.reap_worker(handle, Worker::Read);
        }
        self.outgoing.clear();
    }

    /// Bounded join: wait for the worker's shutdown signal up to the
    /// grace period, then abandon the thread rather than block forever.
    fn reap_worker(&self, handle: JoinHandle<()>, worker: Worker) {
        let flags = self.shutdown.flags.lock().unwrap();
        let cv = match worker {
            Worker::Read => &self.shutdown.read_cv,
            Worker::Write => &self.shutdown.write_cv,
        };
        let done = |f: &mut ShutdownFlags| match worker {
            Worker::Read => f.read_done,
            Worker::Write => f.write_done,
        };
        let (flags, timeout) = cv
            .wait_timeout_while(flags, self.config.shutdown_grace, |f| !done(f))
            .unwrap();
        drop(flags);
        if timeout.timed_out() {
            warn!(uid = self.uid, ?worker, "worker did not exit in time, detaching");
            drop(handle);
        } else {
            let _ = handle.join();
        }
    }

    /// Queue one outgoing message, coalescing it with pending messages
    /// for the same entry. Cheap and synchronous; nothing touches the
    /// wire until [`Connection::post_outgoing`].
    pub fn queue_outgoing(&self, msg: Message) {
        self.pending.lock().unwrap().buffer.queue(msg);
    }

    /// Flush the merge buffer into the transmit queue as one batch.
    ///
    /// On an empty buffer, sends a synthetic keep-alive instead, but
    /// only if `keep_alive` is requested and at least the keep-alive
    /// interval has passed since the last flush, so idle connections are
    /// not flooded.
    pub fn post_outgoing(&self, keep_alive: bool) {
        let mut pending = self.pending.lock().unwrap();
        let now = Instant::now();
        if pending.buffer.is_empty() {
            if !keep_alive {
                return;
            }
            if let Some(last) = pending.last_post {
                if now.duration_since(last) < self.config.keepalive_interval {
                    return;
                }
            }
            self.outgoing.push(vec![Some(Message::KeepAlive)]);
        } else {
            let batch = pending.buffer.take();
            self.outgoing.push(batch);
        }
        pending.last_post = Some(now);
    }

    /// Snapshot of identity and health, as delivered to the notifier.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            remote_id: self.remote_id(),
            remote_ip: self.transport.peer_ip(),
            remote_port: self.transport.peer_port(),
            last_update: self.last_update.load(Ordering::SeqCst),
            proto_rev: self.proto_rev(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Currently negotiated protocol revision.
    pub fn proto_rev(&self) -> u16 {
        self.proto_rev.load(Ordering::SeqCst)
    }

    /// Re-target the codecs; called by handshake logic mid-negotiation.
    pub fn set_proto_rev(&self, proto_rev: u16) {
        self.proto_rev.store(proto_rev, Ordering::SeqCst);
    }

    /// Peer self-identification; empty until the handshake learns it.
    pub fn remote_id(&self) -> String {
        self.remote_id.lock().unwrap().clone()
    }

    /// Record the peer's identity; called by handshake logic.
    pub fn set_remote_id(&self, remote_id: &str) {
        *self.remote_id.lock().unwrap() = remote_id.to_owned();
    }

    /// Micros since the Unix epoch of the last decoded incoming message.
    pub fn last_update(&self) -> u64 {
        self.last_update.load(Ordering::SeqCst)
    }

    /// Identifier assigned by the owning layer, for log correlation.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    fn set_state(&self, requested: ConnectionState) {
        // the delivery guard spans both the transition and the callback,
        // so callbacks arrive in transition order; the state lock itself
        // is released first, so a notifier may call state()/info() freely
        let _delivery = self.notify_order.lock().unwrap();
        let event = {
            let mut state = self.state.lock().unwrap();
            let (next, event) = transition(*state, requested);
            *state = next;
            event
        };
        match event {
            Some(ConnectionEvent::Connected) => self.notifier.notify_connection(true, self.info()),
            Some(ConnectionEvent::Disconnected) => {
                self.notifier.notify_connection(false, self.info());
            }
            None => {}
        }
    }

    fn read_thread_main(self: Arc<Self>) {
        // raised on every exit path, so stop() always gets its signal
        let _signal = SignalOnExit {
            conn: &self,
            worker: Worker::Read,
        };
        let mut decoder = WireDecoder::new(
            TransportReader(Arc::clone(&self.transport)),
            self.proto_rev(),
        );

        self.set_state(ConnectionState::Handshake);
        let handshake_ok = {
            let conn = &*self;
            let entry_type = &self.entry_type;
            let mut read_one = || {
                decoder.set_proto_rev(conn.proto_rev());
                decoder.reset();
                let resolver = |kind: MessageKind, id: EntryId| entry_type(kind, id);
                match decoder.read_message(&resolver) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(uid = conn.uid, error = %e, "error reading in handshake");
                        None
                    }
                }
            };
            let mut send = |msgs: Vec<Message>| {
                conn.outgoing.push(msgs.into_iter().map(Some).collect());
            };
            (self.handshake)(conn, &mut read_one, &mut send)
        };
        if !handshake_ok {
            self.set_state(ConnectionState::Dead);
            self.active.store(false, Ordering::SeqCst);
            return;
        }

        self.set_state(ConnectionState::Active);
        while self.active.load(Ordering::SeqCst) {
            decoder.set_proto_rev(self.proto_rev());
            decoder.reset();
            let entry_type = &self.entry_type;
            let resolver = |kind: MessageKind, id: EntryId| entry_type(kind, id);
            match decoder.read_message(&resolver) {
                Ok(Some(msg)) => {
                    trace!(uid = self.uid, kind = ?msg.kind(), "received message");
                    self.last_update.store(now_micros(), Ordering::SeqCst);
                    (self.process_incoming)(msg, &self);
                }
                Ok(None) => {
                    // peer hung up cleanly
                    self.transport.close();
                    break;
                }
                Err(e) => {
                    info!(uid = self.uid, error = %e, "read error");
                    // terminate the connection on a bad message
                    self.transport.close();
                    break;
                }
            }
        }
        debug!(uid = self.uid, "read thread died");
        self.set_state(ConnectionState::Dead);
        self.active.store(false, Ordering::SeqCst);
        // also kill the write thread
        self.outgoing.push(Vec::new());
    }

    fn write_thread_main(self: Arc<Self>) {
        let _signal = SignalOnExit {
            conn: &self,
            worker: Worker::Write,
        };
        let mut encoder = WireEncoder::new(self.proto_rev());

        while self.active.load(Ordering::SeqCst) {
            let batch = self.outgoing.pop();
            trace!(uid = self.uid, "write thread woke up");
            if batch.is_empty() {
                // terminator: loop around and re-check the active flag
                continue;
            }
            encoder.set_proto_rev(self.proto_rev());
            encoder.reset();
            for msg in batch.iter().flatten() {
                trace!(uid = self.uid, kind = ?msg.kind(), "sending message");
                if let Err(e) = encoder.write_message(msg) {
                    warn!(uid = self.uid, error = %e, "dropping unencodable message");
                }
            }
            if encoder.is_empty() {
                continue;
            }
            // one transport write per batch
            match self.transport.send(encoder.data()) {
                Ok(0) => break,
                Ok(n) => trace!(uid = self.uid, bytes = n, "sent batch"),
                Err(e) => {
                    debug!(uid = self.uid, error = %e, "send failed");
                    break;
                }
            }
        }
        debug!(uid = self.uid, "write thread died");
        self.set_state(ConnectionState::Dead);
        self.active.store(false, Ordering::SeqCst);
        // also kill the read thread
        self.transport.close();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Scoped-exit guard raising a worker's shutdown signal on every path
/// out of its thread main, panics included.
struct SignalOnExit<'a> {
    conn: &'a Connection,
    worker: Worker,
}

impl Drop for SignalOnExit<'_> {
    fn drop(&mut self) {
        let mut flags = match self.conn.shutdown.flags.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match self.worker {
            Worker::Read => {
                flags.read_done = true;
                self.conn.shutdown.read_cv.notify_one();
            }
            Worker::Write => {
                flags.write_done = true;
                self.conn.shutdown.write_cv.notify_one();
            }
        }
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use crate::transport::memory;

    fn idle_connection() -> Arc<Connection> {
        let (a, _b) = memory::pair();
        Connection::new(
            1,
            Arc::new(a),
            RecordingNotifier::new(),
            Box::new(|_, _, _| true),
            Box::new(|_, _| None),
            Box::new(|_, _| {}),
        )
    }

    #[test]
    fn test_keep_alive_rate_limited() {
        let conn = idle_connection();
        conn.post_outgoing(true);
        assert_eq!(conn.outgoing.try_pop(), Some(vec![Some(Message::KeepAlive)]));
        // second request inside the interval sends nothing
        conn.post_outgoing(true);
        assert_eq!(conn.outgoing.try_pop(), None);
    }

    #[test]
    fn test_post_without_keep_alive_on_empty_buffer_sends_nothing() {
        let conn = idle_connection();
        conn.post_outgoing(false);
        assert!(conn.outgoing.try_pop().is_none());
    }

    #[test]
    fn test_queue_then_post_flushes_merged_batch() {
        let conn = idle_connection();
        let update = |seq, v| Message::EntryUpdate {
            id: EntryId(1),
            seq_num: nettable_core::SeqNum(seq),
            value: nettable_core::Value::Double(v),
        };
        conn.queue_outgoing(update(1, 1.0));
        conn.queue_outgoing(update(2, 2.0));
        conn.post_outgoing(false);
        let batch = conn.outgoing.try_pop().unwrap();
        let live: Vec<_> = batch.iter().flatten().collect();
        assert_eq!(live, vec![&update(2, 2.0)]);
    }

    #[test]
    fn test_non_empty_flush_resets_keep_alive_clock() {
        let conn = idle_connection();
        conn.queue_outgoing(Message::KeepAlive);
        conn.post_outgoing(false);
        conn.outgoing.clear();
        // the flush above counts as traffic; an immediate keep-alive
        // request must stay silent
        conn.post_outgoing(true);
        assert!(conn.outgoing.try_pop().is_none());
    }

    #[test]
    fn test_keep_alive_resumes_after_interval_elapses() {
        let (a, _b) = memory::pair();
        let conn = Connection::with_config(
            1,
            Arc::new(a),
            RecordingNotifier::new(),
            Box::new(|_, _, _| true),
            Box::new(|_, _| None),
            Box::new(|_, _| {}),
            ConnectionConfig {
                keepalive_interval: Duration::from_millis(50),
                ..ConnectionConfig::default()
            },
        );
        conn.post_outgoing(true);
        assert_eq!(conn.outgoing.try_pop(), Some(vec![Some(Message::KeepAlive)]));
        conn.post_outgoing(true);
        assert_eq!(conn.outgoing.try_pop(), None);
        // once the interval has passed, the next request goes through
        thread::sleep(Duration::from_millis(60));
        conn.post_outgoing(true);
        assert_eq!(conn.outgoing.try_pop(), Some(vec![Some(Message::KeepAlive)]));
    }

    #[test]
    fn test_racing_activation_and_death_never_invert_events() {
        // connected must never be observed after disconnected, however
        // the transitions race
        for _ in 0..200 {
            let (a, _b) = memory::pair();
            let notifier = RecordingNotifier::new();
            let conn = Connection::new(
                3,
                Arc::new(a),
                Arc::clone(&notifier) as Arc<dyn ConnectionNotifier>,
                Box::new(|_, _, _| true),
                Box::new(|_, _| None),
                Box::new(|_, _| {}),
            );
            let activate = {
                let conn = Arc::clone(&conn);
                thread::spawn(move || conn.set_state(ConnectionState::Active))
            };
            let kill = {
                let conn = Arc::clone(&conn);
                thread::spawn(move || conn.set_state(ConnectionState::Dead))
            };
            activate.join().unwrap();
            kill.join().unwrap();
            let events: Vec<bool> = notifier.events().iter().map(|(c, _)| *c).collect();
            assert!(
                events == vec![true, false] || events == vec![false],
                "event order inverted: {events:?}"
            );
        }
    }

    #[test]
    fn test_set_state_notifies_once_per_direction() {
        let (a, _b) = memory::pair();
        let notifier = RecordingNotifier::new();
        let conn = Connection::new(
            2,
            Arc::new(a),
            Arc::clone(&notifier) as Arc<dyn ConnectionNotifier>,
            Box::new(|_, _, _| true),
            Box::new(|_, _| None),
            Box::new(|_, _| {}),
        );
        conn.set_state(ConnectionState::Active);
        conn.set_state(ConnectionState::Active);
        conn.set_state(ConnectionState::Dead);
        conn.set_state(ConnectionState::Dead);
        conn.set_state(ConnectionState::Active);
        let events: Vec<bool> = notifier.events().iter().map(|(c, _)| *c).collect();
        assert_eq!(events, vec![true, false]);
    }
}
