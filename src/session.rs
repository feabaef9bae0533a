//! Per-session document store

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::controller::Action;

/// Errors from session lookup
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    NotFound(Uuid),
}

/// Documents held for one browser session
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionState {
    script: Option<String>,
    overview: Option<String>,
    converted: Option<String>,
}

impl SessionState {
    /// Replace the script; previous overview and conversion no longer apply
    pub fn set_script(&mut self, text: impl Into<String>) {
        self.script = Some(text.into());
        self.overview = None;
        self.converted = None;
    }

    pub fn set_overview(&mut self, text: impl Into<String>) {
        self.overview = Some(text.into());
    }

    pub fn set_converted(&mut self, text: impl Into<String>) {
        self.converted = Some(text.into());
    }

    /// Stored script, if non-empty
    pub fn script(&self) -> Option<&str> {
        non_empty(&self.script)
    }

    pub fn overview(&self) -> Option<&str> {
        non_empty(&self.overview)
    }

    /// Stored conversion, if non-empty
    pub fn converted(&self) -> Option<&str> {
        non_empty(&self.converted)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Ticket for an in-flight action run
#[derive(Debug)]
pub struct ActionTicket {
    action: Action,
    generation: u64,
    token: CancellationToken,
}

impl ActionTicket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// One browser session: documents plus the cancellation handles of running actions
#[derive(Debug)]
pub struct Session {
    state: Mutex<SessionState>,
    in_flight: Mutex<HashMap<Action, (u64, CancellationToken)>>,
    generation: std::sync::atomic::AtomicU64,
    last_access: Mutex<Instant>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            in_flight: Mutex::new(HashMap::new()),
            generation: std::sync::atomic::AtomicU64::new(0),
            last_access: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_access.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
    }

    /// Time since the session was created or last looked up
    pub fn idle_for(&self) -> Duration {
        self.last_access
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .elapsed()
    }

    /// Lock the documents. Never held across an await point.
    pub fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new run of `action`, cancelling the previous run of the same action
    pub fn begin(&self, action: Action) -> ActionTicket {
        let generation = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((_, previous)) = in_flight.insert(action, (generation, token.clone())) {
            previous.cancel();
        }
        ActionTicket {
            action,
            generation,
            token,
        }
    }

    /// Drop the registration if it still belongs to `ticket`
    pub fn finish(&self, ticket: &ActionTicket) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if matches!(in_flight.get(&ticket.action), Some((g, _)) if *g == ticket.generation) {
            in_flight.remove(&ticket.action);
        }
    }

    /// Number of actions currently running
    pub fn running(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

/// All live sessions, keyed by id
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty session and return its id
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(id, Arc::new(Session::new()));
        id
    }

    /// Look up a session and mark it as active
    pub fn get(&self, id: Uuid) -> Result<Arc<Session>, SessionError> {
        let session = self
            .sessions
            .get(&id)
            .map(|s| Arc::clone(&s))
            .ok_or(SessionError::NotFound(id))?;
        session.touch();
        Ok(session)
    }

    /// Drop sessions idle longer than `ttl` that have no action running
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.running() > 0 || session.idle_for() <= ttl);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!(evicted, remaining = self.sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Start background eviction of idle sessions
    pub fn start_eviction_task(self: Arc<Self>, ttl: Duration, interval_secs: u64) {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
            loop {
                ticker.tick().await;
                debug!(sessions = self.len(), "Sweeping idle sessions");
                self.evict_idle(ttl);
            }
        });
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_script_clears_derived() {
        let mut state = SessionState::default();
        state.set_script("CREATE TABLE a (id INT);");
        state.set_overview("one table");
        state.set_converted("CREATE TABLE a (id INTEGER);");

        state.set_script("CREATE TABLE b (id INT);");
        assert_eq!(state.script(), Some("CREATE TABLE b (id INT);"));
        assert_eq!(state.overview(), None);
        assert_eq!(state.converted(), None);
    }

    #[test]
    fn test_empty_text_reads_as_absent() {
        let mut state = SessionState::default();
        state.set_script("");
        state.set_converted("");
        assert_eq!(state.script(), None);
        assert_eq!(state.converted(), None);
    }

    #[test]
    fn test_begin_cancels_same_action_only() {
        let session = Session::new();
        let first = session.begin(Action::Convert);
        let other = session.begin(Action::Diagram);
        let second = session.begin(Action::Convert);

        assert!(first.token().is_cancelled());
        assert!(!other.token().is_cancelled());
        assert!(!second.token().is_cancelled());
    }

    #[test]
    fn test_stale_finish_keeps_newer_registration() {
        let session = Session::new();
        let first = session.begin(Action::Verify);
        let second = session.begin(Action::Verify);

        session.finish(&first);
        assert_eq!(session.running(), 1);
        session.finish(&second);
        assert_eq!(session.running(), 0);
    }

    #[test]
    fn test_store_lookup() {
        let store = SessionStore::new();
        let id = store.create();
        assert!(store.get(id).is_ok());
        assert!(matches!(
            store.get(Uuid::new_v4()),
            Err(SessionError::NotFound(_))
        ));
        assert!(store.remove(id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_idle_sessions_are_evicted() {
        let store = SessionStore::new();
        let idle = store.create();
        let active = store.create();

        std::thread::sleep(Duration::from_millis(50));
        store.get(active).unwrap();

        assert_eq!(store.evict_idle(Duration::from_millis(25)), 1);
        assert!(matches!(store.get(idle), Err(SessionError::NotFound(_))));
        assert!(store.get(active).is_ok());
    }

    #[test]
    fn test_running_session_survives_eviction() {
        let store = SessionStore::new();
        let id = store.create();
        let session = store.get(id).unwrap();
        let _ticket = session.begin(Action::Convert);

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(store.evict_idle(Duration::ZERO), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_eviction_task_sweeps() {
        let store = Arc::new(SessionStore::new());
        store.create();
        store.create();
        std::thread::sleep(Duration::from_millis(5));

        Arc::clone(&store).start_eviction_task(Duration::ZERO, 60);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());
    }
}
