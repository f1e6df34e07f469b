//! In-memory conversation sessions.
//!
//! A session is an append-ordered list of turns keyed by an opaque id.
//! Nothing is persisted; sessions disappear on explicit clear, idle
//! expiry, or process exit.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged message within a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Turn {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

struct SessionEntry {
    turns: Vec<Turn>,
    last_touched: Instant,
}

/// Store for all live sessions. A single lock over the whole map is enough
/// for the expected concurrency; appends for the same session id cannot
/// interleave.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    expiry: Duration,
}

impl SessionStore {
    pub fn new(expiry: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            expiry,
        }
    }

    /// Returns the session id to use and a snapshot of its prior turns.
    /// An absent, unknown, or expired id yields a fresh id with empty
    /// history; unknown ids are not an error.
    pub async fn get_or_create(&self, session_id: Option<&str>) -> (String, Vec<Turn>) {
        let mut sessions = self.sessions.lock().await;

        if let Some(id) = session_id {
            match sessions.get_mut(id) {
                Some(entry) if entry.last_touched.elapsed() <= self.expiry => {
                    entry.last_touched = Instant::now();
                    return (id.to_string(), entry.turns.clone());
                }
                Some(_) => {
                    debug!(session_id = id, "session expired, starting fresh");
                    sessions.remove(id);
                }
                None => {
                    debug!(session_id = id, "unknown session id, starting fresh");
                }
            }
        }

        let id = Uuid::new_v4().to_string();
        sessions.insert(
            id.clone(),
            SessionEntry {
                turns: Vec::new(),
                last_touched: Instant::now(),
            },
        );
        debug!(session_id = %id, "created session");
        (id, Vec::new())
    }

    /// Appends one completed user/assistant exchange. A cleared or expired
    /// id is recreated so the turn pair is never lost.
    pub async fn append(&self, session_id: &str, user_text: &str, assistant_text: &str) {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                turns: Vec::new(),
                last_touched: Instant::now(),
            });
        entry.turns.push(Turn::user(user_text));
        entry.turns.push(Turn::assistant(assistant_text));
        entry.last_touched = Instant::now();
    }

    /// Removes the session; returns whether it existed. Clearing an absent
    /// id is a no-op, not an error.
    pub async fn clear(&self, session_id: &str) -> bool {
        let existed = self.sessions.lock().await.remove(session_id).is_some();
        if existed {
            debug!(session_id, "cleared session");
        }
        existed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Drops all idle-expired sessions; returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_touched.elapsed() <= self.expiry);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn fresh_session_has_empty_history() {
        let store = store();
        let (id, turns) = store.get_or_create(None).await;
        assert!(!id.is_empty());
        assert!(turns.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_id_yields_a_new_session() {
        let store = store();
        let (id, turns) = store.get_or_create(Some("never-seen")).await;
        assert_ne!(id, "never-seen");
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn appends_preserve_order() {
        let store = store();
        let (id, _) = store.get_or_create(None).await;
        store.append(&id, "first question", "first answer").await;
        store.append(&id, "second question", "second answer").await;

        let (same_id, turns) = store.get_or_create(Some(&id)).await;
        assert_eq!(same_id, id);
        assert_eq!(
            turns,
            vec![
                Turn::user("first question"),
                Turn::assistant("first answer"),
                Turn::user("second question"),
                Turn::assistant("second answer"),
            ]
        );
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let store = store();
        let (id, _) = store.get_or_create(None).await;
        assert!(store.clear(&id).await);
        assert!(!store.clear(&id).await);
        assert!(!store.clear("never-created").await);
    }

    #[tokio::test]
    async fn expired_sessions_behave_as_absent() {
        let store = SessionStore::new(Duration::ZERO);
        let (id, _) = store.get_or_create(None).await;
        store.append(&id, "hello", "hi").await;

        let (new_id, turns) = store.get_or_create(Some(&id)).await;
        assert_ne!(new_id, id);
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let store = SessionStore::new(Duration::ZERO);
        let _ = store.get_or_create(None).await;
        let _ = store.get_or_create(None).await;
        assert_eq!(store.sweep_expired().await, 2);
        assert_eq!(store.len().await, 0);
    }
}
