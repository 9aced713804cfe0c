//! The connection reactor and its collaborators.
//!
//! One dedicated reactor thread owns the selector and the server socket; a
//! caller-supplied executor runs one exchange per task. A connection moves
//! through a small lifecycle:
//!
//! ```text
//!        ┌──────────┐  read-ready: deregister, submit to worker
//!        │   Idle   │ ───────────────────────────────┐
//!        └────┬─────┘                                ▼
//!             ▲                              ┌──────────────┐
//!             │ reactor re-registers         │   Running    │
//!        ┌────┴─────┐   keep-alive exchange  └──────┬───────┘
//!        │  Ready   │ ◄──────────────────────────────┤
//!        └──────────┘                                │ close requested,
//!                                                    ▼ error, or timeout
//!                                             ┌──────────────┐
//!                                             │    Closed    │
//!                                             └──────────────┘
//! ```
//!
//! Ownership transfers are one-directional handoffs: reactor to worker by
//! deregister-then-submit, worker to reactor by ready-set-then-wakeup.

pub mod connection;
pub mod dispatch;
pub mod exchange;
pub mod executor;
mod reactor;
mod worker;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use mio::net::TcpListener;
use mio::{Poll, Token, Waker};
use tracing::info;

use crate::config::Config;
use crate::session::{self, SessionStore};

pub use connection::{Connection, Lifecycle, TransportWriter};
pub use dispatch::{Dispatcher, Handler};
pub use exchange::Exchange;
pub use executor::{Executor, InlineExecutor, WorkerPool};

/// State shared between the reactor, the workers and the sweeper.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) shutdown: Arc<AtomicBool>,
    ready: Mutex<Vec<Arc<Connection>>>,
    running: Mutex<HashMap<Token, Arc<Connection>>>,
    waker: Arc<Waker>,
}

impl Shared {
    /// Worker-to-reactor handoff: queue the connection for re-registration
    /// and wake the selector.
    pub(crate) fn release(&self, connection: Arc<Connection>) {
        lock(&self.ready).push(connection);
        let _ = self.waker.wake();
    }

    pub(crate) fn take_ready(&self) -> Vec<Arc<Connection>> {
        std::mem::take(&mut *lock(&self.ready))
    }

    pub(crate) fn insert_running(&self, connection: Arc<Connection>) {
        lock(&self.running).insert(connection.token(), connection);
    }

    pub(crate) fn remove_running(&self, token: Token) {
        lock(&self.running).remove(&token);
    }

    fn close_all(&self) {
        for (_, connection) in lock(&self.running).drain() {
            connection.close();
        }
        for connection in lock(&self.ready).drain(..) {
            connection.close();
        }
    }
}

/// Used to stop a running server from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}

/// The HTTP server: listener, reactor, dispatch table and session store.
pub struct Server {
    config: Config,
    dispatcher: Dispatcher,
    executor: Arc<dyn Executor>,
    shutdown: Arc<AtomicBool>,
    poll: Poll,
    waker: Arc<Waker>,
    listener: TcpListener,
    local_addr: SocketAddr,
    sessions: Arc<SessionStore>,
}

impl Server {
    /// Binds the listener and prepares the selector. The default executor
    /// runs exchanges inline on the reactor thread; call
    /// [`Server::set_executor`] for real concurrency.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let addr: SocketAddr = config
            .server
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address {:?}", config.server.listen_addr))?;
        let listener = TcpListener::bind(addr)
            .with_context(|| format!("Cannot bind to {}", addr))?;
        let local_addr = listener.local_addr()?;
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), reactor::WAKER)?);
        let sessions = Arc::new(SessionStore::new(config.session.max_inactive_interval()));

        Ok(Self {
            config,
            dispatcher: Dispatcher::new(),
            executor: Arc::new(InlineExecutor),
            shutdown: Arc::new(AtomicBool::new(false)),
            poll,
            waker,
            listener,
            local_addr,
            sessions,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        self.sessions.clone()
    }

    /// The flag the reactor polls between iterations; setting it stops the
    /// server within one poll timeout.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Handle that stops the server promptly (flag plus selector wakeup).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: self.shutdown.clone(),
            waker: self.waker.clone(),
        }
    }

    pub fn set_executor(&mut self, executor: Arc<dyn Executor>) {
        self.executor = executor;
    }

    /// Registers a handler under a path prefix. First registration wins on
    /// overlapping prefixes.
    pub fn handle(&mut self, prefix: impl Into<String>, handler: impl Handler + 'static) {
        self.dispatcher.register(prefix, Arc::new(handler));
    }

    /// Runs the reactor on the calling thread until shutdown.
    pub fn run(self) -> anyhow::Result<()> {
        let Server {
            config,
            dispatcher,
            executor,
            shutdown,
            poll,
            waker,
            listener,
            local_addr,
            sessions,
        } = self;

        let session_sweep_interval = config.session.sweep_interval();
        let shared = Arc::new(Shared {
            config,
            dispatcher,
            sessions: sessions.clone(),
            shutdown: shutdown.clone(),
            ready: Mutex::new(Vec::new()),
            running: Mutex::new(HashMap::new()),
            waker,
        });

        info!("Listening on {}", local_addr);
        let sweeper = session::spawn_sweeper(sessions, session_sweep_interval, shutdown.clone());

        let mut reactor = reactor::Reactor::new(poll, listener, shared.clone(), executor)?;
        reactor.run();

        shared.close_all();
        let _ = sweeper.join();
        info!("Server stopped");
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
