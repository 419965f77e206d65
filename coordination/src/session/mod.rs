//! Session persistence: one committed [`DebateState`] per session id.
//!
//! A session is leased for the duration of a run; a second concurrent start
//! for the same id is rejected with [`SessionError::Busy`]. Reads do not need
//! a lease because records are replaced atomically.
//!
//! [`DebateState`]: crate::debate::DebateState

pub mod file;
pub mod memory;
pub mod record;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileSessionStore;
pub use memory::InMemorySessionStore;
pub use record::{validate_record, IntegrityStatus, SessionRecord};

/// Longest accepted session identifier.
pub const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{session_id}' is already running")]
    Busy { session_id: String },

    #[error("invalid session id '{0}' (use letters, digits, '-', '_', '.')")]
    InvalidId(String),

    #[error("lease for '{lease}' cannot write session '{record}'")]
    LeaseMismatch { lease: String, record: String },

    #[error("session I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session record codec failed: {reason}")]
    Codec { reason: String },

    #[error("session record version mismatch: expected <= {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("session '{session_id}' is corrupted: {reason}")]
    Corrupted { session_id: String, reason: String },
}

impl SessionError {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Reject ids that could escape the store directory or collide with
/// temp/lock files.
pub fn validate_session_id(id: &str) -> Result<(), SessionError> {
    let ok = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(SessionError::InvalidId(id.to_string()))
    }
}

/// Exclusive hold on one session. Released on drop.
pub struct SessionLease {
    session_id: String,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SessionLease {
    pub fn new(session_id: impl Into<String>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            session_id: session_id.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn check_writes(&self, record: &SessionRecord) -> Result<(), SessionError> {
        if record.session_id != self.session_id {
            return Err(SessionError::LeaseMismatch {
                lease: self.session_id.clone(),
                record: record.session_id.clone(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Storage backend for session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Take the exclusive lease for `session_id`.
    async fn acquire(&self, session_id: &str) -> Result<SessionLease, SessionError>;

    /// Latest committed record, or `None` for a new session.
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Atomically replace the record. The lease must match the record's id.
    async fn save(&self, lease: &SessionLease, record: &SessionRecord) -> Result<(), SessionError>;
}
