//! Moderator: closes each round and decides whether the debate is over.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{prompts, DebateNode, NodeContext, NodeError, NodeUpdate};
use crate::debate::{AgentRole, DebateState, DebateStatus, TurnDraft};
use crate::provider::{CallPurpose, ChatMessage, CompletionRequest};

const SUPPORT_MARKER: &str = "decision: support";
const OPPOSE_MARKER: &str = "decision: oppose";
const APPROVED_MARKER: &str = "approved";

/// Terminal marker found in a moderator response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Support,
    Oppose,
    /// Legacy bare "approved" marker.
    Approved,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Support => write!(f, "support"),
            Self::Oppose => write!(f, "oppose"),
            Self::Approved => write!(f, "approved"),
        }
    }
}

/// Case-insensitive substring scan for a terminal marker.
///
/// Structured markers take precedence over the bare "approved"; when both
/// structured markers appear the earlier one wins.
pub fn parse_verdict(text: &str) -> Option<Verdict> {
    let lower = text.to_lowercase();
    let support = lower.find(SUPPORT_MARKER);
    let oppose = lower.find(OPPOSE_MARKER);
    match (support, oppose) {
        (Some(s), Some(o)) if o < s => Some(Verdict::Oppose),
        (Some(_), _) => Some(Verdict::Support),
        (None, Some(_)) => Some(Verdict::Oppose),
        (None, None) if lower.contains(APPROVED_MARKER) => Some(Verdict::Approved),
        (None, None) => None,
    }
}

/// Status after a moderator pass in round `round` of `max_rounds`.
pub fn resolve_status(verdict: Option<Verdict>, round: u32, max_rounds: u32) -> DebateStatus {
    match verdict {
        Some(_) => DebateStatus::Approved,
        None if round >= max_rounds => DebateStatus::MaxRoundsReached,
        None => DebateStatus::NeedsRevision,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Moderator;

#[async_trait]
impl DebateNode for Moderator {
    fn role(&self) -> AgentRole {
        AgentRole::Moderator
    }

    fn name(&self) -> &'static str {
        "moderator"
    }

    async fn run(&self, state: &DebateState, ctx: &NodeContext) -> Result<NodeUpdate, NodeError> {
        let round = state.round_count + 1;
        let request = CompletionRequest::new(
            CallPurpose::Moderation,
            prompts::MODERATOR,
            ctx.temperatures.moderator,
        )
        .with_messages(prompts::history_messages(&state.turns))
        .push(ChatMessage::user(prompts::moderator_directive(
            round,
            ctx.max_rounds,
        )));

        let content = ctx.complete(&request).await?;
        let verdict = parse_verdict(&content);
        let status = resolve_status(verdict, round, ctx.max_rounds);
        info!(
            round,
            max_rounds = ctx.max_rounds,
            verdict = verdict.map(|v| v.to_string()).as_deref().unwrap_or("none"),
            status = %status,
            "moderator pass complete"
        );

        Ok(NodeUpdate {
            new_turns: vec![TurnDraft::new(AgentRole::Moderator, content.trim())],
            status: Some(status),
            round_count: Some(round),
            verdict,
            ..NodeUpdate::default()
        })
    }
}
