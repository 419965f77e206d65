//! Roundtable coordination library
//!
//! This library provides the debate orchestration engine behind the
//! `roundtable` CLI:
//! - A resumable debate state machine over an append-only turn log
//! - Four role-specialized nodes (context gatherer, proposer, critic, moderator)
//! - A workflow executor with a round budget, runaway-loop bound, and cancellation
//! - Retry with jittered exponential backoff for transient provider failures
//! - Leased, atomically written session persistence
//!
//! # Flow
//!
//! ```text
//! SessionStore::load → begin_question → ContextGatherer → Proposer → Critic
//!                                          → Moderator → route → (Proposer | End)
//!                                          → SessionStore::save
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let ctx = NodeContext::new(provider, RetryPolicy::new(), 3);
//! let executor = WorkflowExecutor::new(ctx, ContextGatherer::new(search, calendar));
//! let service = DebateService::new(store, executor);
//! let outcome = service.ask("main_session", "Should I take the sabbatical?", cancel).await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod debate;
pub mod nodes;
pub mod provider;
pub mod retry;
pub mod session;
pub mod testing;
pub mod tools;
pub mod workflow;

pub use debate::{
    AgentRole, ContextSnapshot, DebateState, DebateStatus, HistoryPolicy, SourceSlot, Turn,
    TurnRole,
};
pub use nodes::{ContextGatherer, NodeContext, Temperatures, Verdict};
pub use provider::{
    CallPurpose, ChatMessage, ChatRole, CompletionProvider, CompletionRequest, ProviderError,
    ProviderErrorKind,
};
pub use retry::{ProviderCallFailed, RetryEvent, RetryPolicy, RetrySink};
pub use session::{FileSessionStore, InMemorySessionStore, SessionError, SessionStore};
pub use tools::{CalendarProvider, EventWindow, SearchProvider, ToolError};
pub use workflow::{
    DebateService, InterruptReason, RunOutcome, WorkflowError, WorkflowEvent, WorkflowExecutor,
};
