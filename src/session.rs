//! Server-side sessions with time-based eviction.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Session state for one http client.
///
/// Owned by the [`SessionStore`]; connections and requests only hold a
/// reference obtained from the store.
pub struct Session {
    id: Uuid,
    created: Instant,
    last_activity: Mutex<Instant>,
    max_inactive_interval: Duration,
    attributes: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl Session {
    fn new(max_inactive_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            created: now,
            last_activity: Mutex::new(now),
            max_inactive_interval,
            attributes: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn last_activity(&self) -> Instant {
        *lock(&self.last_activity)
    }

    pub fn max_inactive_interval(&self) -> Duration {
        self.max_inactive_interval
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Any + Send + Sync) {
        lock(&self.attributes).insert(name.into(), Box::new(value));
    }

    /// Typed attribute lookup; `None` when absent or of another type.
    pub fn attribute<R: Clone + 'static>(&self, name: &str) -> Option<R> {
        lock(&self.attributes)
            .get(name)
            .and_then(|value| value.downcast_ref::<R>())
            .cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        lock(&self.attributes).contains_key(name)
    }

    pub fn remove_attribute(&self, name: &str) {
        lock(&self.attributes).remove(name);
    }

    pub fn clear_attributes(&self) {
        lock(&self.attributes).clear();
    }

    pub fn attribute_names(&self) -> Vec<String> {
        lock(&self.attributes).keys().cloned().collect()
    }

    fn touch(&self, now: Instant) {
        *lock(&self.last_activity) = now;
    }

    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activity()) > self.max_inactive_interval
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

/// Concurrent map of session id to session.
///
/// Ids are random 128-bit values; collisions are treated as impossible, so
/// creation never retries.
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Arc<Session>>>,
    max_inactive_interval: Duration,
}

impl SessionStore {
    pub fn new(max_inactive_interval: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_inactive_interval,
        }
    }

    /// Creates a fresh session stamped with the current time.
    pub fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(self.max_inactive_interval));
        lock(&self.sessions).insert(session.id(), session.clone());
        session
    }

    /// Looks a session up, refreshing its last-activity timestamp as a side
    /// effect. A miss is not an error, just "no session".
    pub fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        let session = lock(&self.sessions).get(&id).cloned()?;
        session.touch(Instant::now());
        Some(session)
    }

    /// Clears the session's attributes and removes it. A second destroy is a
    /// no-op.
    pub fn destroy(&self, id: Uuid) {
        if let Some(session) = lock(&self.sessions).remove(&id) {
            session.clear_attributes();
        }
    }

    /// Removes every session inactive for longer than its max-inactive
    /// interval. Returns the number of sessions removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, session| !session.expired(now));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }
}

/// Spawns the background sweeper thread.
///
/// Runs independently of request traffic until the shutdown flag is set;
/// the flag is checked often enough that joining is prompt.
pub(crate) fn spawn_sweeper(
    store: Arc<SessionStore>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let step = Duration::from_millis(50);
        let mut next_sweep = Instant::now() + interval;
        while !shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(step.min(interval));
            let now = Instant::now();
            if now >= next_sweep {
                let removed = store.sweep(now);
                if removed > 0 {
                    tracing::debug!("Swept {} expired sessions", removed);
                }
                next_sweep = now + interval;
            }
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
