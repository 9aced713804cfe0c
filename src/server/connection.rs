use std::fmt;
use std::io::Write;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use mio::Token;
use mio::net::TcpStream;

/// Connection lifecycle states.
///
/// `Idle` connections are registered with the selector and owned by the
/// reactor; `Running` connections are deregistered and owned by a worker;
/// `Ready` connections await re-registration after a keep-alive exchange;
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Idle = 0,
    Running = 1,
    Ready = 2,
    Closed = 3,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Idle,
            1 => Lifecycle::Running,
            2 => Lifecycle::Ready,
            _ => Lifecycle::Closed,
        }
    }
}

/// Per-socket record consumed by the reactor and the workers.
///
/// A connection is owned exclusively by the reactor while `Idle`/`Ready` and
/// by a worker while `Running`; ownership moves through one-directional
/// handoffs, never shared mutation. State transitions are compare-and-swap,
/// which is what upholds the "registered or submitted, never both"
/// invariant.
pub struct Connection {
    token: Token,
    stream: Mutex<TcpStream>,
    peer: SocketAddr,
    created: Instant,
    last_activity: Mutex<Instant>,
    state: AtomicU8,
    keep_alive: AtomicBool,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(token: Token, stream: TcpStream, peer: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            token,
            stream: Mutex::new(stream),
            peer,
            created: now,
            last_activity: Mutex::new(now),
            state: AtomicU8::new(Lifecycle::Idle as u8),
            keep_alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn last_activity(&self) -> Instant {
        *lock(&self.last_activity)
    }

    /// Stamps the connection as active now.
    pub fn touch(&self) {
        *lock(&self.last_activity) = Instant::now();
    }

    pub fn state(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Attempts an atomic state transition; returns whether it took effect.
    /// Only the current owner's expected state can win, so two claimants
    /// never both succeed.
    pub fn try_transition(&self, from: Lifecycle, to: Lifecycle) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::SeqCst)
    }

    pub fn set_keep_alive(&self, keep_alive: bool) {
        self.keep_alive.store(keep_alive, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Exclusive access to the transport. Held by the reactor only for
    /// registration calls and by the owning worker for the exchange.
    pub fn stream(&self) -> MutexGuard<'_, TcpStream> {
        lock(&self.stream)
    }

    /// Closes the connection: shuts down the read and write directions
    /// independently, tolerating errors on each step. Idempotent and safe
    /// from any thread.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let stream = self.stream();
            let _ = stream.shutdown(Shutdown::Read);
            let _ = stream.shutdown(Shutdown::Write);
            self.state.store(Lifecycle::Closed as u8, Ordering::SeqCst);
        }
    }
}

/// Blocking-style writer over a non-blocking stream.
///
/// Workers are allowed to block their own thread, never the reactor's, so
/// short `WouldBlock` windows are ridden out by yielding and retrying.
pub struct TransportWriter<'a> {
    stream: &'a mut TcpStream,
}

impl<'a> TransportWriter<'a> {
    pub fn new(stream: &'a mut TcpStream) -> Self {
        Self { stream }
    }
}

impl std::io::Write for TransportWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        loop {
            match self.stream.write(buf) {
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::yield_now();
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                result => return result,
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection[{}]", self.peer)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
