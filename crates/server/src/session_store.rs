//! In-memory registry of live executors, keyed by session id with a
//! secondary index from websocket client id, guarded by a single mutex
//! (matches the teacher's `TerminalConnectionManager` shape — a small
//! synchronous map behind a lock, not an actor).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::executor::SessionExecutor;

struct Entry {
    executor: Arc<SessionExecutor>,
    client_id: String,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Entry>>,
    by_client: Mutex<HashMap<String, HashSet<String>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, session_id: &str, client_id: &str) -> Arc<SessionExecutor> {
        let executor = Arc::new(SessionExecutor::new(session_id));
        self.sessions.lock().expect("session store lock poisoned").insert(
            session_id.to_string(),
            Entry {
                executor: executor.clone(),
                client_id: client_id.to_string(),
            },
        );
        self.by_client
            .lock()
            .expect("session store lock poisoned")
            .entry(client_id.to_string())
            .or_default()
            .insert(session_id.to_string());
        executor
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionExecutor>> {
        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .get(session_id)
            .map(|e| e.executor.clone())
    }

    pub fn has(&self, session_id: &str) -> bool {
        self.sessions.lock().expect("session store lock poisoned").contains_key(session_id)
    }

    /// Removes the entry, also dropping it from the client index. Called
    /// when a session's `complete` event fires, and by `remove_by_client`.
    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionExecutor>> {
        let entry = self
            .sessions
            .lock()
            .expect("session store lock poisoned")
            .remove(session_id)?;
        if let Some(set) = self
            .by_client
            .lock()
            .expect("session store lock poisoned")
            .get_mut(&entry.client_id)
        {
            set.remove(session_id);
        }
        Some(entry.executor)
    }

    /// Removes and cancels every session owned by `client_id`. Used on
    /// websocket disconnect.
    pub fn remove_by_client(&self, client_id: &str) -> Vec<Arc<SessionExecutor>> {
        let session_ids: Vec<String> = self
            .by_client
            .lock()
            .expect("session store lock poisoned")
            .remove(client_id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();

        let mut removed = Vec::with_capacity(session_ids.len());
        let mut sessions = self.sessions.lock().expect("session store lock poisoned");
        for session_id in session_ids {
            if let Some(entry) = sessions.remove(&session_id) {
                entry.executor.cancel();
                removed.push(entry.executor);
            }
        }
        removed
    }

    pub fn get_all(&self) -> Vec<Arc<SessionExecutor>> {
        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .values()
            .map(|e| e.executor.clone())
            .collect()
    }
}
