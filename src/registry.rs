//! Single authoritative table of sessions, keyed by session id.
//!
//! All session mutation routes through the records held here; other
//! components hold `Arc` references to the same records and lock them
//! per-session. Records are never removed — termination changes status,
//! it does not delete.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::session::Session;

/// Shared handle to one session record.
pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SharedSession>,
    /// Session ids in creation order.
    order: Vec<String>,
}

/// Registry of all sessions created during this supervisor's lifetime.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created session and return its shared handle.
    pub async fn insert(&self, session: Session) -> SharedSession {
        let id = session.id.clone();
        let shared: SharedSession = Arc::new(Mutex::new(session));
        let mut inner = self.inner.lock().await;
        inner.order.push(id.clone());
        inner.sessions.insert(id, Arc::clone(&shared));
        shared
    }

    /// Look up a session by id.
    pub async fn get(&self, id: &str) -> Option<SharedSession> {
        self.inner.lock().await.sessions.get(id).map(Arc::clone)
    }

    /// All session handles in creation order.
    pub async fn list(&self) -> Vec<SharedSession> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.sessions.get(id).map(Arc::clone))
            .collect()
    }

    /// Stable snapshot of session ids in creation order.
    ///
    /// Registry-wide scans (reaper, terminate-all) iterate this snapshot
    /// rather than the live table, since termination mutates records
    /// mid-scan.
    pub async fn ids(&self) -> Vec<String> {
        self.inner.lock().await.order.clone()
    }

    /// Total number of sessions ever registered.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.order.len()
    }

    /// Whether the registry has no sessions.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.order.is_empty()
    }

    /// Number of sessions currently in `Running` status.
    pub async fn count_running(&self) -> usize {
        let handles = self.list().await;
        let mut running = 0;
        for handle in handles {
            if handle.lock().await.is_running() {
                running += 1;
            }
        }
        running
    }

    /// Point-in-time clones of every session, in creation order.
    pub async fn snapshot(&self) -> Vec<Session> {
        let handles = self.list().await;
        let mut sessions = Vec::with_capacity(handles.len());
        for handle in handles {
            sessions.push(handle.lock().await.clone());
        }
        sessions
    }
}
