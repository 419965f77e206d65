use async_trait::async_trait;
use tracing::{info, warn};

use super::{prompts, DebateNode, NodeContext, NodeError, NodeUpdate};
use crate::debate::{AgentRole, DebateState, DebateStatus, TurnDraft};
use crate::provider::{CallPurpose, ChatMessage, CompletionRequest};

/// Argues for the most upside-maximizing course of action.
#[derive(Debug, Clone, Copy, Default)]
pub struct Proposer;

fn insufficient(text: &str) -> bool {
    text.trim().chars().count() < prompts::MIN_PROPOSAL_CHARS
}

#[async_trait]
impl DebateNode for Proposer {
    fn role(&self) -> AgentRole {
        AgentRole::Proposer
    }

    fn name(&self) -> &'static str {
        "proposer"
    }

    async fn run(&self, state: &DebateState, ctx: &NodeContext) -> Result<NodeUpdate, NodeError> {
        let question = state.latest_question().unwrap_or_default();
        let temperature = ctx.temperatures.proposer;

        let request = CompletionRequest::new(CallPurpose::Proposal, prompts::PROPOSER, temperature)
            .with_messages(prompts::history_messages(&state.turns))
            .push(ChatMessage::user(prompts::proposal_directive(question)));
        let mut content = ctx.complete(&request).await?;

        if insufficient(&content) {
            warn!(chars = content.trim().len(), "proposal too short, retrying with simplified prompt");
            let retry = CompletionRequest::new(
                CallPurpose::SimplifiedProposal,
                prompts::PROPOSER_SIMPLIFIED,
                temperature,
            )
            .push(ChatMessage::user(prompts::simplified_proposal(question)));
            content = ctx.complete(&retry).await?;
        }

        if insufficient(&content) {
            warn!("simplified proposal still too short, using fallback");
            content = prompts::FALLBACK_PROPOSAL.to_string();
        }

        info!(chars = content.len(), "proposal ready");
        Ok(
            NodeUpdate::turn(TurnDraft::new(AgentRole::Proposer, content.trim()))
                .with_status(DebateStatus::Debating),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::debate::HistoryPolicy;
    use crate::provider::ProviderError;
    use crate::retry::{FailureReason, RetryPolicy};
    use crate::testing::ScriptedProvider;

    const LONG: &str = "Launch the product in spring with a focused beta cohort and a paid pilot.";

    fn setup(provider: ScriptedProvider) -> (NodeContext, Arc<ScriptedProvider>, DebateState) {
        let provider = Arc::new(provider);
        let ctx = NodeContext::new(provider.clone(), RetryPolicy::new(), 3);
        let mut state = DebateState::new();
        state.begin_question("Should I launch?", HistoryPolicy::default());
        (ctx, provider, state)
    }

    #[tokio::test]
    async fn test_adequate_proposal_used_directly() {
        let (ctx, provider, state) =
            setup(ScriptedProvider::new().replies(CallPurpose::Proposal, &[LONG]));
        let update = Proposer.run(&state, &ctx).await.unwrap();
        assert_eq!(update.new_turns[0].content, LONG);
        assert_eq!(update.status, Some(DebateStatus::Debating));
        assert_eq!(provider.count(CallPurpose::SimplifiedProposal), 0);
    }

    #[tokio::test]
    async fn test_empty_proposal_retried_once() {
        let (ctx, provider, state) = setup(
            ScriptedProvider::new()
                .replies(CallPurpose::Proposal, &[""])
                .replies(CallPurpose::SimplifiedProposal, &[LONG]),
        );
        let update = Proposer.run(&state, &ctx).await.unwrap();
        assert_eq!(update.new_turns[0].content, LONG);
        assert_eq!(provider.count(CallPurpose::Proposal), 1);
        assert_eq!(provider.count(CallPurpose::SimplifiedProposal), 1);
    }

    #[tokio::test]
    async fn test_fallback_after_two_short_answers() {
        let (ctx, provider, state) = setup(
            ScriptedProvider::new()
                .replies(CallPurpose::Proposal, &["ok"])
                .replies(CallPurpose::SimplifiedProposal, &["   sure   "]),
        );
        let update = Proposer.run(&state, &ctx).await.unwrap();
        assert_eq!(update.new_turns[0].content, prompts::FALLBACK_PROPOSAL);
        assert!(update.new_turns[0].content.starts_with("[fallback proposal]"));
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_terminal_failure_propagates() {
        let (ctx, _, state) = setup(
            ScriptedProvider::new()
                .script(CallPurpose::Proposal, [Err(ProviderError::auth("401"))]),
        );
        let NodeError::Provider(err) = Proposer.run(&state, &ctx).await.unwrap_err();
        assert_eq!(err.reason, FailureReason::Fatal);
    }

    #[tokio::test]
    async fn test_request_carries_history_and_directive() {
        let (ctx, provider, state) = setup(ScriptedProvider::new());
        Proposer.run(&state, &ctx).await.unwrap();
        let call = &provider.calls()[0];
        assert_eq!(call.temperature, 0.9);
        assert_eq!(call.messages.first().unwrap().content, "Should I launch?");
        assert!(call.messages.last().unwrap().content.contains("visionary proposal"));
    }
}
