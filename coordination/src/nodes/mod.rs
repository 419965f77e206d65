//! Debate nodes: the four agents that take turns on a question.
//!
//! ## Lifecycle
//!
//! ```text
//! executor → node.run(&state, &ctx)   : read-only view of the state
//!          ← NodeUpdate               : new turns, snapshot, status, round
//! executor applies the update, emits a WorkflowEvent, picks the next node
//! ```
//!
//! Nodes never mutate the state directly, so a node failure leaves the state
//! exactly as it was after the previous node.

pub mod context_gatherer;
pub mod critic;
pub mod moderator;
pub mod prompts;
pub mod proposer;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::debate::{AgentRole, ContextSnapshot, DebateState, DebateStatus, TurnDraft};
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::retry::{complete_with_retry, ProviderCallFailed, RetryPolicy};

pub use context_gatherer::ContextGatherer;
pub use critic::Critic;
pub use moderator::{parse_verdict, Moderator, Verdict};
pub use proposer::Proposer;

/// Sampling temperature per agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Temperatures {
    pub context_gatherer: f32,
    pub proposer: f32,
    pub critic: f32,
    pub moderator: f32,
}

impl Default for Temperatures {
    fn default() -> Self {
        Self {
            context_gatherer: 0.1,
            proposer: 0.9,
            critic: 0.3,
            moderator: 0.7,
        }
    }
}

impl Temperatures {
    pub fn for_role(&self, role: AgentRole) -> f32 {
        match role {
            AgentRole::ContextGatherer => self.context_gatherer,
            AgentRole::Proposer => self.proposer,
            AgentRole::Critic => self.critic,
            AgentRole::Moderator => self.moderator,
        }
    }

    pub fn all(&self) -> [(AgentRole, f32); 4] {
        [
            (AgentRole::ContextGatherer, self.context_gatherer),
            (AgentRole::Proposer, self.proposer),
            (AgentRole::Critic, self.critic),
            (AgentRole::Moderator, self.moderator),
        ]
    }
}

/// Shared context handed to every node.
#[derive(Clone)]
pub struct NodeContext {
    pub provider: Arc<dyn CompletionProvider>,
    pub retry: RetryPolicy,
    /// Round budget `R`.
    pub max_rounds: u32,
    pub temperatures: Temperatures,
}

impl NodeContext {
    pub fn new(provider: Arc<dyn CompletionProvider>, retry: RetryPolicy, max_rounds: u32) -> Self {
        Self {
            provider,
            retry,
            max_rounds,
            temperatures: Temperatures::default(),
        }
    }

    pub fn with_temperatures(mut self, temperatures: Temperatures) -> Self {
        self.temperatures = temperatures;
        self
    }

    /// Let backoff waits end early when `token` fires.
    pub fn with_retry_cancellation(mut self, token: CancellationToken) -> Self {
        self.retry = self.retry.with_cancellation(token);
        self
    }

    /// Issue a completion call through the retry policy.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderCallFailed> {
        complete_with_retry(self.provider.as_ref(), &self.retry, request).await
    }
}

/// Changes a node asks the executor to apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub new_turns: Vec<TurnDraft>,
    pub context_snapshot: Option<ContextSnapshot>,
    pub status: Option<DebateStatus>,
    pub round_count: Option<u32>,
    /// Only set by the moderator.
    pub verdict: Option<Verdict>,
}

impl NodeUpdate {
    pub fn turn(draft: TurnDraft) -> Self {
        Self {
            new_turns: vec![draft],
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: DebateStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error(transparent)]
    Provider(#[from] ProviderCallFailed),
}

impl NodeError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_cancelled(),
        }
    }
}

/// One agent in the debate.
#[async_trait]
pub trait DebateNode: Send + Sync {
    fn role(&self) -> AgentRole;

    /// Node name for logging and events.
    fn name(&self) -> &'static str;

    async fn run(&self, state: &DebateState, ctx: &NodeContext) -> Result<NodeUpdate, NodeError>;
}
