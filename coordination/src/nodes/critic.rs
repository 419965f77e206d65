use async_trait::async_trait;
use tracing::info;

use super::{prompts, DebateNode, NodeContext, NodeError, NodeUpdate};
use crate::debate::{AgentRole, DebateState, TurnDraft};
use crate::provider::{CallPurpose, ChatMessage, CompletionRequest};

/// Checks the latest proposal against the gathered data.
///
/// The snapshot is rendered explicitly as the final message so the critic
/// argues from the same data the gatherer saw.
#[derive(Debug, Clone, Copy, Default)]
pub struct Critic;

#[async_trait]
impl DebateNode for Critic {
    fn role(&self) -> AgentRole {
        AgentRole::Critic
    }

    fn name(&self) -> &'static str {
        "critic"
    }

    async fn run(&self, state: &DebateState, ctx: &NodeContext) -> Result<NodeUpdate, NodeError> {
        let brief = match &state.context_snapshot {
            Some(snapshot) => snapshot.critic_brief(),
            None => "REAL-TIME CONTEXT: none was gathered for this question.".to_string(),
        };

        let request = CompletionRequest::new(
            CallPurpose::Critique,
            prompts::CRITIC,
            ctx.temperatures.critic,
        )
        .with_messages(prompts::history_messages(&state.turns))
        .push(ChatMessage::user(brief));

        let content = ctx.complete(&request).await?;
        info!(chars = content.len(), "critique ready");
        Ok(NodeUpdate::turn(TurnDraft::new(AgentRole::Critic, content.trim())))
    }
}
