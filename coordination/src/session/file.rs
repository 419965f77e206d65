//! Directory-backed session store.
//!
//! Layout under the store directory:
//!
//! ```text
//! <id>.json       committed record
//! <id>.json.tmp   in-progress write, renamed over <id>.json
//! <id>.lock       lease held by a running process
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{
    validate_session_id, IntegrityStatus, SessionError, SessionLease, SessionRecord, SessionStore,
};

#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Open the store, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SessionError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    fn temp_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json.tmp"))
    }

    pub fn lock_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.lock"))
    }

    /// Remove a stale lock left by a crashed process. Returns whether a lock
    /// file existed.
    pub async fn break_lock(&self, session_id: &str) -> Result<bool, SessionError> {
        validate_session_id(session_id)?;
        let path = self.lock_path(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                warn!(session = session_id, path = %path.display(), "removed stale session lock");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::io(path, e)),
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn acquire(&self, session_id: &str) -> Result<SessionLease, SessionError> {
        validate_session_id(session_id)?;
        let path = self.lock_path(session_id);
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SessionError::Busy {
                    session_id: session_id.to_string(),
                });
            }
            Err(e) => return Err(SessionError::io(path, e)),
        };

        let owner = format!("pid={} acquired_at={}\n", std::process::id(), Utc::now().to_rfc3339());
        if let Err(e) = file.write_all(owner.as_bytes()).await {
            // lock is still held; the owner line is informational
            warn!(error = %e, "could not write session lock owner");
        }
        debug!(session = session_id, "session lease acquired");

        let release_path = path.clone();
        Ok(SessionLease::new(session_id, move || {
            if let Err(e) = std::fs::remove_file(&release_path) {
                warn!(path = %release_path.display(), error = %e, "failed to release session lock");
            }
        }))
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        validate_session_id(session_id)?;
        let path = self.record_path(session_id);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::io(path, e)),
        };
        let (record, status) = SessionRecord::restore(&json)?;
        if let IntegrityStatus::Recoverable { warnings } = &status {
            warn!(session = session_id, warnings = ?warnings, "session record loaded with warnings");
        }
        Ok(Some(record))
    }

    async fn save(&self, lease: &SessionLease, record: &SessionRecord) -> Result<(), SessionError> {
        lease.check_writes(record)?;
        let json = record.to_json()?;
        let temp = self.temp_path(&record.session_id);
        let target = self.record_path(&record.session_id);

        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| SessionError::io(&temp, e))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| SessionError::io(&temp, e))?;
        file.sync_all()
            .await
            .map_err(|e| SessionError::io(&temp, e))?;
        drop(file);

        tokio::fs::rename(&temp, &target)
            .await
            .map_err(|e| SessionError::io(&target, e))?;
        sync_dir(&self.dir).await?;
        debug!(
            session = %record.session_id,
            sequence = record.sequence,
            turns = record.state.turns.len(),
            "session saved"
        );
        Ok(())
    }
}

/// Persist the directory entry written by a rename.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<(), SessionError> {
    let handle = tokio::fs::File::open(dir)
        .await
        .map_err(|e| SessionError::io(dir, e))?;
    handle.sync_all().await.map_err(|e| SessionError::io(dir, e))
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<(), SessionError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::{AgentRole, DebateState, HistoryPolicy, TurnDraft};

    fn state() -> DebateState {
        let mut state = DebateState::new();
        state.begin_question("Launch in spring?", HistoryPolicy::default());
        state.append(TurnDraft::new(AgentRole::ContextGatherer, "ctx"));
        state
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        let lease = store.acquire("main_session").await.unwrap();

        let record = SessionRecord::new("main_session", 1, state());
        store.save(&lease, &record).await.unwrap();

        assert!(store.record_path("main_session").exists());
        assert!(!store.temp_path("main_session").exists());
        let loaded = store.load("main_session").await.unwrap().unwrap();
        assert_eq!(loaded.state.turns, record.state.turns);
        assert_eq!(loaded.sequence, 1);
    }

    #[tokio::test]
    async fn test_overwrite_syncs_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        let lease = store.acquire("main_session").await.unwrap();

        store
            .save(&lease, &SessionRecord::new("main_session", 1, state()))
            .await
            .unwrap();
        let mut next = state();
        next.append(TurnDraft::new(AgentRole::Proposer, "Take it in April."));
        store
            .save(&lease, &SessionRecord::new("main_session", 2, next))
            .await
            .unwrap();

        sync_dir(dir.path()).await.unwrap();
        let loaded = store.load("main_session").await.unwrap().unwrap();
        assert_eq!(loaded.sequence, 2);
        assert_eq!(loaded.state.turns.len(), 3);
        assert!(!store.temp_path("main_session").exists());
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        assert!(store.load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();

        let lease = store.acquire("s").await.unwrap();
        assert!(store.lock_path("s").exists());
        assert!(store.acquire("s").await.unwrap_err().is_busy());

        drop(lease);
        assert!(!store.lock_path("s").exists());
        assert!(store.acquire("s").await.is_ok());
    }

    #[tokio::test]
    async fn test_second_store_instance_sees_lock() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileSessionStore::open(dir.path()).await.unwrap();
        let b = FileSessionStore::open(dir.path()).await.unwrap();
        let _lease = a.acquire("s").await.unwrap();
        assert!(b.acquire("s").await.unwrap_err().is_busy());
    }

    #[tokio::test]
    async fn test_break_stale_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        std::fs::write(store.lock_path("s"), "pid=1").unwrap();

        assert!(store.acquire("s").await.unwrap_err().is_busy());
        assert!(store.break_lock("s").await.unwrap());
        assert!(!store.break_lock("s").await.unwrap());
        assert!(store.acquire("s").await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupted_record_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        std::fs::write(store.record_path("s"), "{\"version\": 1").unwrap();
        assert!(matches!(
            store.load("s").await,
            Err(SessionError::Codec { .. })
        ));
    }
}
