//! Workflow executor and the debate service built on top of it.
//!
//! ```text
//! Start → ContextGatherer → Proposer → Critic → Moderator ─┬─ route = End → End
//!                              ▲                           │
//!                              └──────── route = Continue ─┘
//! ```

pub mod executor;
pub mod service;

use serde::Serialize;
use thiserror::Error;

use crate::debate::{ContextSnapshot, DebateStatus, TransitionError, Turn};
use crate::nodes::Verdict;
use crate::retry::ProviderCallFailed;
use crate::session::SessionError;

pub use executor::{Step, WorkflowExecutor};
pub use service::DebateService;

/// Emitted after every node so the presentation layer can stream turns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowEvent {
    pub node_name: &'static str,
    pub new_turns: Vec<Turn>,
    pub status: DebateStatus,
    pub round_count: u32,
    /// Set only when the node replaced the snapshot.
    pub context_delta: Option<ContextSnapshot>,
    pub verdict: Option<Verdict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptReason {
    Cancelled,
    TimedOut,
}

impl std::fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// How a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { status: DebateStatus, rounds: u32 },
    /// Stopped between nodes; the committed state is resumable.
    Interrupted { reason: InterruptReason, status: DebateStatus },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{node} failed: {source}")]
    Provider {
        node: &'static str,
        #[source]
        source: ProviderCallFailed,
    },

    #[error("runaway loop: moderator pass {passes} exceeds bound {bound}")]
    RunawayLoop { passes: u32, bound: u32 },

    #[error("{node} produced an invalid status change: {source}")]
    Transition {
        node: &'static str,
        #[source]
        source: TransitionError,
    },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("session '{0}' has no interrupted run to resume")]
    NothingToResume(String),

    #[error("question is empty")]
    EmptyQuestion,
}

impl WorkflowError {
    /// Internal errors are bugs in the loop itself, never retried.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::RunawayLoop { .. } | Self::Transition { .. })
    }
}
