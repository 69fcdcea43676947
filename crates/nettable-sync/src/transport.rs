//! Transport abstraction for the connection engine.
//!
//! The engine drives a blocking byte stream: the reader thread parks in
//! `read`, the writer thread parks in `send`, and `close`, callable from
//! any other thread, must make both return promptly. Implementations may
//! be TCP sockets, serial links, or the in-process pair in [`memory`].

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

/// Blocking byte-stream transport.
///
/// All methods take `&self`: the reader and writer threads and the
/// shutdown path share one transport concurrently.
pub trait Transport: Send + Sync {
    /// Read up to `buf.len()` bytes, blocking until at least one byte is
    /// available. `Ok(0)` means the stream has ended.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `data`, blocking as needed. Returns the bytes written;
    /// `Ok(0)` or `Err` means the connection is unusable.
    fn send(&self, data: &[u8]) -> io::Result<usize>;

    /// Tear the stream down. Must be safe to call from a thread other
    /// than the one blocked in `read`/`send`, and must cause those
    /// blocked calls to return promptly. Idempotent.
    fn close(&self);

    /// Disable transmit coalescing (Nagle) where the transport has any.
    /// The engine already batches messages per flush.
    fn set_no_delay(&self);

    /// Peer address for diagnostics.
    fn peer_ip(&self) -> String;

    /// Peer port for diagnostics.
    fn peer_port(&self) -> u16;
}

/// Adapter lending a [`Transport`] to byte-oriented consumers such as the
/// wire decoder.
pub struct TransportReader(pub Arc<dyn Transport>);

impl io::Read for TransportReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

/// [`Transport`] over a TCP stream.
pub struct TcpTransport {
    stream: TcpStream,
    peer_ip: String,
    peer_port: u16,
}

impl TcpTransport {
    /// Wrap a connected stream. The peer address is captured eagerly so
    /// diagnostics keep working after the socket dies.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            peer_ip: peer.ip().to_string(),
            peer_port: peer.port(),
        })
    }
}

impl Transport for TcpTransport {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    fn send(&self, data: &[u8]) -> io::Result<usize> {
        // a short write would truncate a batch mid-message and desync
        // the peer's decoder, so push until everything is out
        (&self.stream).write_all(data)?;
        Ok(data.len())
    }

    fn close(&self) {
        // both halves, so a parked reader on the other side of the
        // process wakes as well
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn set_no_delay(&self) {
        let _ = self.stream.set_nodelay(true);
    }

    fn peer_ip(&self) -> String {
        self.peer_ip.clone()
    }

    fn peer_port(&self) -> u16 {
        self.peer_port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_tcp_send_delivers_every_byte() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let mut total = 0usize;
            loop {
                let n = sock.read(&mut buf).unwrap();
                if n == 0 {
                    return total;
                }
                total += n;
            }
        });

        let transport = TcpTransport::new(TcpStream::connect(addr).unwrap()).unwrap();
        // large enough to exceed the socket send buffer, forcing the
        // kernel to accept it in several chunks
        let data = vec![0xA5u8; 1 << 20];
        assert_eq!(transport.send(&data).unwrap(), data.len());
        transport.close();
        assert_eq!(server.join().unwrap(), data.len());
    }
}

/// In-process duplex transport for tests.
///
/// Two endpoints share a pair of byte pipes. `close` on either endpoint
/// wakes every blocked reader on both sides, mirroring the behavior the
/// engine requires from a real socket.
pub mod memory {
    use super::Transport;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Condvar, Mutex};

    /// One direction of the duplex pair.
    #[derive(Default)]
    struct Pipe {
        state: Mutex<PipeState>,
        readable: Condvar,
    }

    #[derive(Default)]
    struct PipeState {
        buf: VecDeque<u8>,
        closed: bool,
    }

    impl Pipe {
        fn write(&self, data: &[u8]) -> io::Result<usize> {
            let mut st = self.state.lock().unwrap();
            if st.closed {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
            }
            st.buf.extend(data);
            self.readable.notify_all();
            Ok(data.len())
        }

        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            let mut st = self.state.lock().unwrap();
            loop {
                if !st.buf.is_empty() {
                    let n = buf.len().min(st.buf.len());
                    for slot in buf.iter_mut().take(n) {
                        *slot = st.buf.pop_front().unwrap();
                    }
                    return Ok(n);
                }
                if st.closed {
                    return Ok(0);
                }
                st = self.readable.wait(st).unwrap();
            }
        }

        fn close(&self) {
            let mut st = self.state.lock().unwrap();
            st.closed = true;
            self.readable.notify_all();
        }
    }

    /// One endpoint of an in-process duplex pair.
    pub struct MemoryTransport {
        rx: Arc<Pipe>,
        tx: Arc<Pipe>,
        name: &'static str,
        port: u16,
    }

    /// Create a connected pair of endpoints.
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());
        (
            MemoryTransport {
                rx: Arc::clone(&b_to_a),
                tx: Arc::clone(&a_to_b),
                name: "memory-a",
                port: 1,
            },
            MemoryTransport {
                rx: b_to_a,
                tx: a_to_b,
                name: "memory-b",
                port: 2,
            },
        )
    }

    impl Transport for MemoryTransport {
        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            self.rx.read(buf)
        }

        fn send(&self, data: &[u8]) -> io::Result<usize> {
            self.tx.write(data)
        }

        fn close(&self) {
            self.rx.close();
            self.tx.close();
        }

        fn set_no_delay(&self) {}

        fn peer_ip(&self) -> String {
            self.name.to_owned()
        }

        fn peer_port(&self) -> u16 {
            self.port
        }
    }

    /// Transport that never yields data and ignores `close`; used to
    /// exercise the engine's bounded-shutdown fallback.
    #[derive(Default)]
    pub struct WedgedTransport {
        never: Pipe,
    }

    impl WedgedTransport {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Transport for WedgedTransport {
        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            // parks forever: the pipe is never written and never closed
            self.never.read(buf)
        }

        fn send(&self, data: &[u8]) -> io::Result<usize> {
            Ok(data.len())
        }

        fn close(&self) {}

        fn set_no_delay(&self) {}

        fn peer_ip(&self) -> String {
            "wedged".to_owned()
        }

        fn peer_port(&self) -> u16 {
            0
        }
    }

}
