//! Debate data model: turns, statuses, context snapshot, routing.
//!
//! # Status Flow
//!
//! ```text
//! Gathering → Debating → [moderator verdict?]
//!                ▲              │
//!                │              ├─ support / oppose / approved → Approved
//!                │              ├─ none, round == R            → MaxRoundsReached
//!                └─ NeedsRevision ◄─ none, rounds left
//! ```

pub mod context;
pub mod guardrails;
pub mod router;
pub mod state;

pub use context::{ContextSnapshot, SourceError, SourceSlot};
pub use guardrails::{GuardOutcome, RunGuard};
pub use router::{route, Route};
pub use state::{
    AgentRole, DebateState, DebateStatus, HistoryPolicy, TransitionError, Turn, TurnDraft,
    TurnRole,
};
