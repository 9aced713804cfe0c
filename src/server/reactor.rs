use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};

use crate::server::Shared;
use crate::server::connection::{Connection, Lifecycle};
use crate::server::executor::Executor;
use crate::server::worker;

pub(crate) const LISTENER: Token = Token(0);
pub(crate) const WAKER: Token = Token(1);
const FIRST_CONNECTION_TOKEN: usize = 2;

const POLL_TIMEOUT: Duration = Duration::from_millis(1000);
const EVENTS_CAPACITY: usize = 1024;

/// The single-threaded event loop.
///
/// Owns the selector and the server socket exclusively. Each iteration
/// re-registers ready connections, sweeps idle ones on its interval, blocks
/// on the selector with a bounded timeout, and dispatches readiness:
/// accepts become new idle connections, readable connections are
/// deregistered and submitted to the executor.
///
/// Connections are tracked in an explicit token registry, never attached to
/// selector keys.
pub(crate) struct Reactor {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    shared: Arc<Shared>,
    executor: Arc<dyn Executor>,
    idle: HashMap<Token, Arc<Connection>>,
    next_token: usize,
    last_idle_sweep: Instant,
}

impl Reactor {
    pub(crate) fn new(
        poll: Poll,
        mut listener: TcpListener,
        shared: Arc<Shared>,
        executor: Arc<dyn Executor>,
    ) -> anyhow::Result<Self> {
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener,
            shared,
            executor,
            idle: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            last_idle_sweep: Instant::now(),
        })
    }

    /// Runs until the shutdown flag is set. An error escaping a whole
    /// iteration is caught here so the reactor thread never dies silently.
    pub(crate) fn run(&mut self) {
        while !self.shared.shutdown.load(Ordering::SeqCst) {
            if let Err(err) = self.iterate() {
                tracing::error!("Reactor iteration failed: {}", err);
            }
        }
        for (_, connection) in self.idle.drain() {
            connection.close();
        }
    }

    fn iterate(&mut self) -> anyhow::Result<()> {
        self.rearm_ready();
        self.sweep_idle();

        match self.poll.poll(&mut self.events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        let tokens: Vec<Token> = self.events.iter().map(|event| event.token()).collect();
        for token in tokens {
            match token {
                LISTENER => self.accept_ready(),
                WAKER => {}
                token => self.read_ready(token),
            }
        }
        Ok(())
    }

    /// Re-registers connections handed back by workers after a keep-alive
    /// exchange. A failure on one socket is discarded so it cannot halt the
    /// loop.
    fn rearm_ready(&mut self) {
        let ready = self.shared.take_ready();
        for connection in ready {
            if connection.is_closed() {
                continue;
            }
            let registered = {
                let mut stream = connection.stream();
                self.poll
                    .registry()
                    .register(&mut *stream, connection.token(), Interest::READABLE)
            };
            match registered {
                Ok(()) if connection.try_transition(Lifecycle::Ready, Lifecycle::Idle) => {
                    connection.touch();
                    self.idle.insert(connection.token(), connection);
                }
                Ok(()) => {
                    let _ = {
                        let mut stream = connection.stream();
                        self.poll.registry().deregister(&mut *stream)
                    };
                    connection.close();
                }
                Err(err) => {
                    tracing::debug!("{} re-registration failed: {}", connection, err);
                    connection.close();
                }
            }
        }
    }

    /// Closes idle connections whose last activity exceeds the idle
    /// timeout. Runs at most once per sweep interval.
    fn sweep_idle(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_idle_sweep) < self.shared.config.server.idle_sweep_interval()
        {
            return;
        }
        self.last_idle_sweep = now;

        let timeout = self.shared.config.server.idle_timeout();
        let registry = self.poll.registry();
        self.idle.retain(|_, connection| {
            if now.saturating_duration_since(connection.last_activity()) <= timeout {
                return true;
            }
            let _ = {
                let mut stream = connection.stream();
                registry.deregister(&mut *stream)
            };
            connection.close();
            tracing::debug!("{} destroyed after idle timeout", connection);
            false
        });
    }

    /// Accepts every pending connection and registers it for
    /// read-readiness.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = self.allocate_token();
                    if let Err(err) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        tracing::warn!("Registration failed for {}: {}", peer, err);
                        continue;
                    }
                    let connection = Arc::new(Connection::new(token, stream, peer));
                    tracing::debug!("{} created", connection);
                    self.idle.insert(token, connection);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    tracing::warn!("Accept failed: {}", err);
                    break;
                }
            }
        }
    }

    /// Hands a readable connection to the worker pool: deregister first,
    /// then submit, so the socket is never registered while a worker owns
    /// it.
    fn read_ready(&mut self, token: Token) {
        // Stale readiness for a connection the sweep already removed.
        let Some(connection) = self.idle.remove(&token) else {
            return;
        };

        let deregistered = {
            let mut stream = connection.stream();
            self.poll.registry().deregister(&mut *stream)
        };
        if let Err(err) = deregistered {
            tracing::debug!("{} deregistration failed: {}", connection, err);
            connection.close();
            return;
        }

        if !connection.try_transition(Lifecycle::Idle, Lifecycle::Running) {
            connection.close();
            return;
        }

        self.shared.insert_running(connection.clone());
        let shared = self.shared.clone();
        self.executor
            .execute(Box::new(move || worker::run_exchange(&shared, connection)));
    }

    fn allocate_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }
}
