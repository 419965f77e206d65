//! Session-aware entry point: lease, load, run, persist.
//!
//! Persistence rules:
//! - completed or interrupted runs are saved (interrupted ones stay resumable)
//! - failed runs are not saved; the last committed state stays intact

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{RunOutcome, WorkflowError, WorkflowExecutor};
use crate::debate::{DebateState, HistoryPolicy, Turn};
use crate::session::{SessionLease, SessionRecord, SessionStore};

pub struct DebateService {
    store: Arc<dyn SessionStore>,
    executor: WorkflowExecutor,
    history: HistoryPolicy,
}

impl DebateService {
    pub fn new(store: Arc<dyn SessionStore>, executor: WorkflowExecutor) -> Self {
        Self {
            store,
            executor,
            history: HistoryPolicy::default(),
        }
    }

    pub fn with_history_policy(mut self, history: HistoryPolicy) -> Self {
        self.history = history;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Deliberate on a new question within `session_id`.
    pub async fn ask(
        &self,
        session_id: &str,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, WorkflowError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(WorkflowError::EmptyQuestion);
        }

        let lease = self.store.acquire(session_id).await?;
        let (mut state, sequence) = self.load_committed(session_id).await?;
        state.begin_question(question, self.history);
        info!(session = session_id, turns = state.turns.len(), "question received");

        self.run_and_persist(&lease, state, sequence, cancel).await
    }

    /// Continue an interrupted run from its last committed node.
    pub async fn resume(
        &self,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, WorkflowError> {
        let lease = self.store.acquire(session_id).await?;
        let (state, sequence) = self.load_committed(session_id).await?;
        if state.turns.is_empty() || state.is_complete() {
            return Err(WorkflowError::NothingToResume(session_id.to_string()));
        }
        info!(
            session = session_id,
            status = %state.status,
            round = state.round_count,
            "resuming interrupted run"
        );

        self.run_and_persist(&lease, state, sequence, cancel).await
    }

    /// Committed turns of a session, most recent last. `limit` keeps only
    /// the tail.
    pub async fn history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Turn>, WorkflowError> {
        let turns = match self.store.load(session_id).await? {
            Some(record) => record.state.turns,
            None => Vec::new(),
        };
        let skip = limit.map_or(0, |n| turns.len().saturating_sub(n));
        Ok(turns.into_iter().skip(skip).collect())
    }

    /// Committed state, if the session exists.
    pub async fn state(&self, session_id: &str) -> Result<Option<DebateState>, WorkflowError> {
        Ok(self.store.load(session_id).await?.map(|r| r.state))
    }

    async fn load_committed(&self, session_id: &str) -> Result<(DebateState, u64), WorkflowError> {
        Ok(match self.store.load(session_id).await? {
            Some(record) => (record.state, record.sequence),
            None => {
                info!(session = session_id, "new session");
                (DebateState::new(), 0)
            }
        })
    }

    async fn run_and_persist(
        &self,
        lease: &SessionLease,
        mut state: DebateState,
        sequence: u64,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, WorkflowError> {
        let session_id = lease.session_id();
        match self.executor.run(&mut state, cancel).await {
            Ok(outcome) => {
                if !outcome.is_completed() {
                    warn!(session = session_id, ?outcome, "run interrupted, saving committed state");
                }
                let record = SessionRecord::new(session_id, sequence + 1, state);
                self.store.save(lease, &record).await?;
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    session = session_id,
                    internal = e.is_internal(),
                    error = %e,
                    "run failed, keeping last committed state"
                );
                Err(e)
            }
        }
    }
}
