//! Step-by-step driver for one question.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{InterruptReason, RunOutcome, WorkflowError, WorkflowEvent};
use crate::debate::{
    route, AgentRole, DebateState, DebateStatus, GuardOutcome, Route, RunGuard,
};
use crate::nodes::{
    ContextGatherer, Critic, DebateNode, Moderator, NodeContext, NodeError, NodeUpdate, Proposer,
};

/// Position in the deliberation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    ContextGatherer,
    Proposer,
    Critic,
    Moderator,
    End,
}

impl Step {
    /// Transition table. Only the moderator edge is conditional.
    pub fn next(self, state: &DebateState) -> Step {
        match self {
            Self::ContextGatherer => Self::Proposer,
            Self::Proposer => Self::Critic,
            Self::Critic => Self::Moderator,
            Self::Moderator => match route(state) {
                Route::Continue => Self::Proposer,
                Route::End => Self::End,
            },
            Self::End => Self::End,
        }
    }

    /// Where an interrupted run picks up, from the author of the last turn.
    pub fn resume_point(state: &DebateState) -> Step {
        let Some(last) = state.last_turn() else {
            return Self::ContextGatherer;
        };
        match last.author {
            None => Self::ContextGatherer,
            Some(AgentRole::ContextGatherer) => Self::Proposer,
            Some(AgentRole::Proposer) => Self::Critic,
            Some(AgentRole::Critic) => Self::Moderator,
            Some(AgentRole::Moderator) => Self::Moderator.next(state),
        }
    }
}

/// Runs the four nodes over a [`DebateState`] until the router ends the
/// debate, a guardrail interrupts, or a node fails.
pub struct WorkflowExecutor {
    gatherer: Arc<dyn DebateNode>,
    proposer: Arc<dyn DebateNode>,
    critic: Arc<dyn DebateNode>,
    moderator: Arc<dyn DebateNode>,
    ctx: NodeContext,
    question_timeout: Option<Duration>,
    events: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl WorkflowExecutor {
    pub fn new(ctx: NodeContext, gatherer: ContextGatherer) -> Self {
        Self {
            gatherer: Arc::new(gatherer),
            proposer: Arc::new(Proposer),
            critic: Arc::new(Critic),
            moderator: Arc::new(Moderator),
            ctx,
            question_timeout: None,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_question_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.question_timeout = timeout;
        self
    }

    /// Replace the node for one step. `End` is ignored.
    pub fn with_node(mut self, step: Step, node: Arc<dyn DebateNode>) -> Self {
        match step {
            Step::ContextGatherer => self.gatherer = node,
            Step::Proposer => self.proposer = node,
            Step::Critic => self.critic = node,
            Step::Moderator => self.moderator = node,
            Step::End => {}
        }
        self
    }

    pub fn max_rounds(&self) -> u32 {
        self.ctx.max_rounds
    }

    fn node(&self, step: Step) -> Option<&dyn DebateNode> {
        match step {
            Step::ContextGatherer => Some(self.gatherer.as_ref()),
            Step::Proposer => Some(self.proposer.as_ref()),
            Step::Critic => Some(self.critic.as_ref()),
            Step::Moderator => Some(self.moderator.as_ref()),
            Step::End => None,
        }
    }

    /// Drive `state` from its resume point to the end.
    ///
    /// `state` always holds the last committed node's output: on error or
    /// interruption it is exactly what the previous node left behind.
    pub async fn run(
        &self,
        state: &mut DebateState,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, WorkflowError> {
        if !state.status.is_terminal() && state.round_count >= self.ctx.max_rounds {
            // resumed under a smaller round budget than the one it started with
            warn!(
                rounds = state.round_count,
                max_rounds = self.ctx.max_rounds,
                "round budget already spent, closing debate"
            );
            close_at_budget(state)?;
            return Ok(RunOutcome::Completed {
                status: state.status,
                rounds: state.round_count,
            });
        }

        let mut guard = RunGuard::new(
            self.ctx.max_rounds,
            state.round_count,
            self.question_timeout,
            cancel,
        );
        let ctx = self
            .ctx
            .clone()
            .with_retry_cancellation(guard.cancel_token());

        let mut step = Step::resume_point(state);
        info!(?step, round = state.round_count, status = %state.status, "workflow run starting");

        loop {
            let Some(node) = self.node(step) else {
                info!(status = %state.status, rounds = state.round_count, "debate complete");
                return Ok(RunOutcome::Completed {
                    status: state.status,
                    rounds: state.round_count,
                });
            };

            match guard.check() {
                GuardOutcome::Continue => {}
                GuardOutcome::TimedOut { elapsed_ms, budget_ms } => {
                    warn!(node = node.name(), elapsed_ms, budget_ms, "question timed out");
                    return Ok(interrupted(InterruptReason::TimedOut, state));
                }
                other => {
                    info!(node = node.name(), outcome = %other, "run interrupted");
                    return Ok(interrupted(InterruptReason::Cancelled, state));
                }
            }

            if step == Step::Moderator {
                if let GuardOutcome::RunawayLoop { passes, bound } = guard.record_moderator_pass() {
                    error!(passes, bound, "moderator pass bound exceeded");
                    return Err(WorkflowError::RunawayLoop { passes, bound });
                }
            }

            info!(node = node.name(), round = state.round_count, "node starting");
            let update = match node.run(state, &ctx).await {
                Ok(update) => update,
                Err(e) if e.is_cancelled() => {
                    info!(node = node.name(), "cancelled during backoff");
                    return Ok(interrupted(InterruptReason::Cancelled, state));
                }
                Err(NodeError::Provider(source)) => {
                    error!(node = node.name(), error = %source, "node failed");
                    return Err(WorkflowError::Provider {
                        node: node.name(),
                        source,
                    });
                }
            };

            let event = apply(node.name(), state, update)?;
            if let Some(events) = &self.events {
                // a closed receiver only means nobody is rendering
                let _ = events.send(event);
            }

            step = step.next(state);
        }
    }
}

fn close_at_budget(state: &mut DebateState) -> Result<(), WorkflowError> {
    let transition = |state: &mut DebateState, to| {
        state
            .transition(to)
            .map_err(|source| WorkflowError::Transition {
                node: "moderator",
                source,
            })
    };
    if state.status == DebateStatus::NeedsRevision {
        transition(state, DebateStatus::Debating)?;
    }
    transition(state, DebateStatus::MaxRoundsReached)
}

fn interrupted(reason: InterruptReason, state: &DebateState) -> RunOutcome {
    RunOutcome::Interrupted {
        reason,
        status: state.status,
    }
}

/// Apply a node's update to the state and describe it as an event.
///
/// Validation happens before any mutation so a rejected update leaves the
/// state untouched.
fn apply(
    node: &'static str,
    state: &mut DebateState,
    update: NodeUpdate,
) -> Result<WorkflowEvent, WorkflowError> {
    if let Some(status) = update.status {
        if status != state.status && !state.status.valid_transitions().contains(&status) {
            return Err(WorkflowError::Transition {
                node,
                source: crate::debate::TransitionError {
                    from: state.status,
                    to: status,
                },
            });
        }
    }

    let new_turns = update
        .new_turns
        .into_iter()
        .map(|draft| state.append(draft).clone())
        .collect();
    if let Some(snapshot) = &update.context_snapshot {
        state.context_snapshot = Some(snapshot.clone());
    }
    if let Some(round) = update.round_count {
        state.round_count = round;
    }
    if let Some(status) = update.status {
        state
            .transition(status)
            .map_err(|source| WorkflowError::Transition { node, source })?;
    }

    Ok(WorkflowEvent {
        node_name: node,
        new_turns,
        status: state.status,
        round_count: state.round_count,
        context_delta: update.context_snapshot,
        verdict: update.verdict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::{DebateStatus, HistoryPolicy, TurnDraft};
    use crate::provider::CallPurpose;
    use crate::retry::RetryPolicy;
    use crate::testing::ScriptedProvider;

    fn executor(provider: ScriptedProvider) -> (WorkflowExecutor, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let ctx = NodeContext::new(provider.clone(), RetryPolicy::new(), 3);
        (WorkflowExecutor::new(ctx, ContextGatherer::default()), provider)
    }

    fn fresh(question: &str) -> DebateState {
        let mut state = DebateState::new();
        state.begin_question(question, HistoryPolicy::default());
        state
    }

    #[test]
    fn test_transition_table() {
        let mut state = DebateState::new();
        assert_eq!(Step::ContextGatherer.next(&state), Step::Proposer);
        assert_eq!(Step::Proposer.next(&state), Step::Critic);
        assert_eq!(Step::Critic.next(&state), Step::Moderator);
        state.status = DebateStatus::NeedsRevision;
        assert_eq!(Step::Moderator.next(&state), Step::Proposer);
        state.status = DebateStatus::Approved;
        assert_eq!(Step::Moderator.next(&state), Step::End);
    }

    #[test]
    fn test_resume_point_from_last_author() {
        let mut state = fresh("q");
        assert_eq!(Step::resume_point(&state), Step::ContextGatherer);
        state.append(TurnDraft::new(AgentRole::ContextGatherer, "ctx"));
        assert_eq!(Step::resume_point(&state), Step::Proposer);
        state.append(TurnDraft::new(AgentRole::Proposer, "p"));
        assert_eq!(Step::resume_point(&state), Step::Critic);
        state.append(TurnDraft::new(AgentRole::Critic, "c"));
        assert_eq!(Step::resume_point(&state), Step::Moderator);
        state.append(TurnDraft::new(AgentRole::Moderator, "m"));
        state.status = DebateStatus::NeedsRevision;
        assert_eq!(Step::resume_point(&state), Step::Proposer);
    }

    #[tokio::test]
    async fn test_single_round_approval() {
        let (exec, provider) = executor(
            ScriptedProvider::new().replies(CallPurpose::Moderation, &["DECISION: SUPPORT. Go."]),
        );
        let mut state = fresh("Launch?");
        let outcome = exec.run(&mut state, CancellationToken::new()).await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Completed {
                status: DebateStatus::Approved,
                rounds: 1
            }
        );
        // user, gatherer, proposer, critic, moderator
        assert_eq!(state.turns.len(), 5);
        assert_eq!(provider.count(CallPurpose::Moderation), 1);
    }

    #[tokio::test]
    async fn test_events_emitted_per_node() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (exec, _) = executor(
            ScriptedProvider::new().replies(CallPurpose::Moderation, &["decision: oppose"]),
        );
        let exec = exec.with_events(tx);
        let mut state = fresh("q");
        exec.run(&mut state, CancellationToken::new()).await.unwrap();

        let mut names = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            names.push(ev.node_name);
        }
        assert_eq!(names, vec!["context_gatherer", "proposer", "critic", "moderator"]);
    }

    #[tokio::test]
    async fn test_cancel_before_start_leaves_state() {
        let (exec, provider) = executor(ScriptedProvider::new());
        let token = CancellationToken::new();
        token.cancel();
        let mut state = fresh("q");
        let before = state.clone();

        let outcome = exec.run(&mut state, token).await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Interrupted {
                reason: InterruptReason::Cancelled,
                ..
            }
        ));
        assert_eq!(state, before);
        assert!(provider.calls().is_empty());
    }
}
