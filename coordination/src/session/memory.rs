use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{validate_session_id, SessionError, SessionLease, SessionRecord, SessionStore};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local store. Records are kept as serialized JSON so loads go
/// through the same codec and integrity check as the file store.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    records: Arc<Mutex<HashMap<String, String>>>,
    leased: Arc<Mutex<HashSet<String>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_leased(&self, session_id: &str) -> bool {
        lock(&self.leased).contains(session_id)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn acquire(&self, session_id: &str) -> Result<SessionLease, SessionError> {
        validate_session_id(session_id)?;
        if !lock(&self.leased).insert(session_id.to_string()) {
            return Err(SessionError::Busy {
                session_id: session_id.to_string(),
            });
        }
        let leased = self.leased.clone();
        let id = session_id.to_string();
        Ok(SessionLease::new(session_id, move || {
            lock(&leased).remove(&id);
        }))
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        validate_session_id(session_id)?;
        let json = lock(&self.records).get(session_id).cloned();
        match json {
            Some(json) => SessionRecord::restore(&json).map(|(record, _)| Some(record)),
            None => Ok(None),
        }
    }

    async fn save(&self, lease: &SessionLease, record: &SessionRecord) -> Result<(), SessionError> {
        lease.check_writes(record)?;
        let json = record.to_json()?;
        lock(&self.records).insert(record.session_id.clone(), json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::{DebateState, HistoryPolicy};

    #[tokio::test]
    async fn test_second_acquire_is_busy_until_drop() {
        let store = InMemorySessionStore::new();
        let lease = store.acquire("s1").await.unwrap();
        assert!(store.acquire("s1").await.unwrap_err().is_busy());
        // other sessions are independent
        let _other = store.acquire("s2").await.unwrap();
        drop(lease);
        assert!(!store.is_leased("s1"));
        assert!(store.acquire("s1").await.is_ok());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = InMemorySessionStore::new();
        assert!(store.load("s").await.unwrap().is_none());

        let lease = store.acquire("s").await.unwrap();
        let mut state = DebateState::new();
        state.begin_question("q", HistoryPolicy::default());
        store
            .save(&lease, &SessionRecord::new("s", 1, state.clone()))
            .await
            .unwrap();

        let loaded = store.load("s").await.unwrap().unwrap();
        assert_eq!(loaded.state.turns, state.turns);
    }

    #[tokio::test]
    async fn test_lease_mismatch_rejected() {
        let store = InMemorySessionStore::new();
        let lease = store.acquire("a").await.unwrap();
        let err = store
            .save(&lease, &SessionRecord::new("b", 1, DebateState::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::LeaseMismatch { .. }));
    }
}
