//! Versioned on-disk session record and its integrity check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionError;
use crate::debate::{DebateState, DebateStatus, TurnRole};

/// A persisted session: the latest committed state plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Schema version for forward compatibility.
    pub version: u32,
    pub session_id: String,
    /// Number of times this session has been saved.
    pub sequence: u64,
    pub saved_at: DateTime<Utc>,
    pub state: DebateState,
}

impl SessionRecord {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(session_id: impl Into<String>, sequence: u64, state: DebateState) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            session_id: session_id.into(),
            sequence,
            saved_at: Utc::now(),
            state,
        }
    }

    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string_pretty(self).map_err(|e| SessionError::Codec {
            reason: e.to_string(),
        })
    }

    /// Parse and reject versions newer than this build understands.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let record: Self = serde_json::from_str(json).map_err(|e| SessionError::Codec {
            reason: e.to_string(),
        })?;
        if record.version > Self::CURRENT_VERSION {
            return Err(SessionError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: record.version,
            });
        }
        Ok(record)
    }

    /// Parse, validate, and fail on corruption. Warnings are returned.
    pub fn restore(json: &str) -> Result<(Self, IntegrityStatus), SessionError> {
        let record = Self::from_json(json)?;
        let status = validate_record(&record);
        if let IntegrityStatus::Corrupted { errors } = &status {
            return Err(SessionError::Corrupted {
                session_id: record.session_id,
                reason: errors.join("; "),
            });
        }
        Ok((record, status))
    }
}

/// Integrity check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    Valid,
    /// Loadable, with oddities worth logging.
    Recoverable { warnings: Vec<String> },
    Corrupted { errors: Vec<String> },
}

impl IntegrityStatus {
    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Valid | Self::Recoverable { .. })
    }
}

/// Validate a record before handing its state to the executor.
pub fn validate_record(record: &SessionRecord) -> IntegrityStatus {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let state = &record.state;

    if record.version > SessionRecord::CURRENT_VERSION {
        errors.push(format!(
            "version {} > current {}",
            record.version,
            SessionRecord::CURRENT_VERSION
        ));
    }

    // sequence numbers strictly increasing and below the next counter
    let mut previous = 0u64;
    for turn in &state.turns {
        if turn.sequence <= previous {
            errors.push(format!(
                "turn sequence {} not after {}",
                turn.sequence, previous
            ));
        }
        previous = turn.sequence;
    }
    if previous >= state.next_sequence() {
        errors.push(format!(
            "next sequence {} not after last turn {}",
            state.next_sequence(),
            previous
        ));
    }

    for turn in &state.turns {
        match (turn.role, turn.author) {
            (TurnRole::User, Some(author)) => warnings.push(format!(
                "user turn {} carries agent author {}",
                turn.sequence, author
            )),
            (TurnRole::Agent, None) => {
                errors.push(format!("agent turn {} has no author", turn.sequence))
            }
            _ => {}
        }
    }

    if !state.turns.is_empty() && !state.turns.iter().any(|t| t.role == TurnRole::User) {
        warnings.push("history has agent turns but no question".to_string());
    }

    if state.status == DebateStatus::Gathering && state.context_snapshot.is_some() {
        warnings.push("snapshot present while still gathering".to_string());
    }
    if state.status != DebateStatus::Gathering && state.context_snapshot.is_none() {
        warnings.push(format!("status {} without a context snapshot", state.status));
    }

    if !errors.is_empty() {
        IntegrityStatus::Corrupted { errors }
    } else if !warnings.is_empty() {
        IntegrityStatus::Recoverable { warnings }
    } else {
        IntegrityStatus::Valid
    }
}
