//! Debate state machine: statuses, transitions, and the turn log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::ContextSnapshot;

/// Status of the debate for the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    /// Question received, context not yet gathered.
    Gathering,
    /// Context gathered; proposer/critic/moderator are in play.
    Debating,
    /// Moderator asked for another round.
    NeedsRevision,
    /// Moderator issued a terminal decision.
    Approved,
    /// Round budget exhausted without a terminal marker.
    MaxRoundsReached,
}

impl DebateStatus {
    /// Whether this is a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::MaxRoundsReached)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(self) -> &'static [DebateStatus] {
        match self {
            Self::Gathering => &[Self::Debating],
            Self::Debating => &[Self::NeedsRevision, Self::Approved, Self::MaxRoundsReached],
            Self::NeedsRevision => &[Self::Debating],
            Self::Approved | Self::MaxRoundsReached => &[],
        }
    }
}

impl std::fmt::Display for DebateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gathering => write!(f, "gathering"),
            Self::Debating => write!(f, "debating"),
            Self::NeedsRevision => write!(f, "needs_revision"),
            Self::Approved => write!(f, "approved"),
            Self::MaxRoundsReached => write!(f, "max_rounds_reached"),
        }
    }
}

/// Which agent authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    ContextGatherer,
    Proposer,
    Critic,
    Moderator,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContextGatherer => write!(f, "context_gatherer"),
            Self::Proposer => write!(f, "proposer"),
            Self::Critic => write!(f, "critic"),
            Self::Moderator => write!(f, "moderator"),
        }
    }
}

/// Whether a turn came from the user or from an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Agent,
}

/// One immutable contribution to the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    /// `None` for user turns.
    pub author: Option<AgentRole>,
    pub content: String,
    /// Monotonic across the whole session, assigned on append.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn is_user(&self) -> bool {
        self.role == TurnRole::User
    }

    pub fn is_by(&self, agent: AgentRole) -> bool {
        self.author == Some(agent)
    }
}

/// A turn that has not been appended yet.
///
/// Nodes produce drafts; only [`DebateState::append`] assigns sequence numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnDraft {
    pub author: AgentRole,
    pub content: String,
}

impl TurnDraft {
    pub fn new(author: AgentRole, content: impl Into<String>) -> Self {
        Self {
            author,
            content: content.into(),
        }
    }
}

/// How much history to keep when a new question begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPolicy {
    /// Keep only the turns of the most recent `n` questions (current one
    /// included). `None` keeps everything.
    pub max_questions: Option<usize>,
}

impl HistoryPolicy {
    pub fn unbounded() -> Self {
        Self { max_questions: None }
    }

    pub fn last(n: usize) -> Self {
        Self {
            max_questions: Some(n.max(1)),
        }
    }
}

/// Error for invalid status transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: DebateStatus,
    pub to: DebateStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid status transition {} → {} (allowed: {:?})",
            self.from,
            self.to,
            self.from.valid_transitions()
        )
    }
}

impl std::error::Error for TransitionError {}

/// The mutable unit of work for one question, plus the accumulated
/// conversation of earlier questions in the same session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateState {
    pub turns: Vec<Turn>,
    pub context_snapshot: Option<ContextSnapshot>,
    pub round_count: u32,
    pub status: DebateStatus,
    next_sequence: u64,
}

impl Default for DebateState {
    fn default() -> Self {
        Self::new()
    }
}

impl DebateState {
    pub fn new() -> Self {
        Self {
            turns: Vec::new(),
            context_snapshot: None,
            round_count: 0,
            status: DebateStatus::Gathering,
            next_sequence: 1,
        }
    }

    /// Start deliberation on a new question.
    ///
    /// Resets the per-question fields, applies the retention policy and
    /// appends the user turn.
    pub fn begin_question(&mut self, question: &str, policy: HistoryPolicy) -> &Turn {
        self.round_count = 0;
        self.status = DebateStatus::Gathering;
        self.context_snapshot = None;

        self.push(TurnRole::User, None, question.trim().to_string());
        if let Some(keep) = policy.max_questions {
            self.retain_questions(keep);
        }
        // push() always leaves at least the new turn in place
        &self.turns[self.turns.len() - 1]
    }

    /// Append an agent turn, assigning its sequence number.
    pub fn append(&mut self, draft: TurnDraft) -> &Turn {
        self.push(TurnRole::Agent, Some(draft.author), draft.content);
        &self.turns[self.turns.len() - 1]
    }

    fn push(&mut self, role: TurnRole, author: Option<AgentRole>, content: String) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.turns.push(Turn {
            role,
            author,
            content,
            sequence,
            created_at: Utc::now(),
        });
    }

    fn retain_questions(&mut self, keep: usize) {
        let user_positions: Vec<usize> = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_user())
            .map(|(i, _)| i)
            .collect();
        if user_positions.len() <= keep {
            return;
        }
        let cut = user_positions[user_positions.len() - keep];
        self.turns.drain(..cut);
    }

    /// Transition to a new status. Re-setting the current status is a no-op.
    pub fn transition(&mut self, to: DebateStatus) -> Result<(), TransitionError> {
        if self.status == to {
            return Ok(());
        }
        if !self.status.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Content of the most recent user turn.
    pub fn latest_question(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.is_user())
            .map(|t| t.content.as_str())
    }

    /// Turns belonging to the current question (from its user turn onward).
    pub fn current_question_turns(&self) -> &[Turn] {
        let start = self.turns.iter().rposition(|t| t.is_user()).unwrap_or(0);
        &self.turns[start..]
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Sequence number the next appended turn will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] round {} | {} turns | context {}",
            self.status,
            self.round_count,
            self.turns.len(),
            if self.context_snapshot.is_some() {
                "loaded"
            } else {
                "pending"
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state() {
        let state = DebateState::new();
        assert_eq!(state.status, DebateStatus::Gathering);
        assert_eq!(state.round_count, 0);
        assert!(state.turns.is_empty());
        assert!(!state.is_complete());
    }

    #[test]
    fn test_full_status_cycle() {
        let mut state = DebateState::new();
        state.begin_question("Should I move?", HistoryPolicy::default());
        state.transition(DebateStatus::Debating).unwrap();
        state.transition(DebateStatus::NeedsRevision).unwrap();
        state.transition(DebateStatus::Debating).unwrap();
        state.transition(DebateStatus::Approved).unwrap();
        assert!(state.is_complete());
    }

    #[test]
    fn test_same_status_is_noop() {
        let mut state = DebateState::new();
        state.transition(DebateStatus::Debating).unwrap();
        state.transition(DebateStatus::Debating).unwrap();
        assert_eq!(state.status, DebateStatus::Debating);
    }

    #[test]
    fn test_invalid_transition() {
        let mut state = DebateState::new();
        let err = state.transition(DebateStatus::Approved).unwrap_err();
        assert_eq!(err.from, DebateStatus::Gathering);
        assert_eq!(err.to, DebateStatus::Approved);
        assert!(err.to_string().contains("gathering → approved"));
    }

    #[test]
    fn test_terminal_has_no_transitions() {
        let mut state = DebateState::new();
        state.transition(DebateStatus::Debating).unwrap();
        state.transition(DebateStatus::MaxRoundsReached).unwrap();
        assert!(state.transition(DebateStatus::Debating).is_err());
    }

    #[test]
    fn test_sequence_numbers_are_monotonic() {
        let mut state = DebateState::new();
        state.begin_question("q1", HistoryPolicy::default());
        state.append(TurnDraft::new(AgentRole::ContextGatherer, "ctx"));
        state.append(TurnDraft::new(AgentRole::Proposer, "idea"));
        let seqs: Vec<u64> = state.turns.iter().map(|t| t.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(state.next_sequence(), 4);
    }

    #[test]
    fn test_begin_question_resets_but_keeps_turns() {
        let mut state = DebateState::new();
        state.begin_question("first", HistoryPolicy::default());
        state.transition(DebateStatus::Debating).unwrap();
        state.round_count = 2;
        state.transition(DebateStatus::Approved).unwrap();

        state.begin_question("second", HistoryPolicy::default());
        assert_eq!(state.status, DebateStatus::Gathering);
        assert_eq!(state.round_count, 0);
        assert!(state.context_snapshot.is_none());
        assert_eq!(state.turns.len(), 2);
        assert_eq!(state.latest_question(), Some("second"));
    }

    #[test]
    fn test_retention_keeps_last_questions() {
        let mut state = DebateState::new();
        for q in ["a", "b", "c"] {
            state.begin_question(q, HistoryPolicy::last(2));
            state.append(TurnDraft::new(AgentRole::Moderator, format!("answer {q}")));
        }
        let contents: Vec<&str> = state.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "answer b", "c", "answer c"]);
        // eviction never rewinds sequence numbers
        assert_eq!(state.turns[0].sequence, 3);
        assert_eq!(state.next_sequence(), 7);
    }

    #[test]
    fn test_current_question_turns() {
        let mut state = DebateState::new();
        state.begin_question("old", HistoryPolicy::default());
        state.append(TurnDraft::new(AgentRole::Moderator, "done"));
        state.begin_question("new", HistoryPolicy::default());
        state.append(TurnDraft::new(AgentRole::ContextGatherer, "ctx"));
        let current = state.current_question_turns();
        assert_eq!(current.len(), 2);
        assert_eq!(current[0].content, "new");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(DebateStatus::Gathering.to_string(), "gathering");
        assert_eq!(DebateStatus::NeedsRevision.to_string(), "needs_revision");
        assert_eq!(DebateStatus::MaxRoundsReached.to_string(), "max_rounds_reached");
        assert_eq!(AgentRole::ContextGatherer.to_string(), "context_gatherer");
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&DebateStatus::MaxRoundsReached).unwrap();
        assert_eq!(json, "\"max_rounds_reached\"");
    }
}
