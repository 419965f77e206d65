//! Scripted fakes for the provider and tool traits.
//!
//! Responses are queued per [`CallPurpose`]; when a queue is empty the
//! provider falls back to a fixed default for that purpose. Every request is
//! recorded so tests can assert on what each node sent.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::provider::{CallPurpose, CompletionProvider, CompletionRequest, ProviderError};
use crate::tools::{
    CalendarProvider, EventAck, EventList, EventWindow, SearchProvider, SearchResults, ToolError,
};

pub const DEFAULT_PROPOSAL: &str = "Go all in: commit the next quarter to this, line up two \
early customers, and set a hard checkpoint at week six to measure traction.";
pub const DEFAULT_CRITIQUE: &str = "The calendar shows a deadline in three days; the budget \
cannot absorb this without cutting the savings buffer.";
pub const DEFAULT_MODERATION: &str = "Both sides raise fair points; the panel should revise.";

type Script = VecDeque<Result<String, ProviderError>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ScriptedProvider {
    scripts: Mutex<HashMap<CallPurpose, Script>>,
    defaults: HashMap<CallPurpose, String>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        let defaults = HashMap::from([
            (CallPurpose::NeedsWebLookup, "NO".to_string()),
            (CallPurpose::WebFindings, "Rates are 6.1% as of this week.".to_string()),
            (CallPurpose::Proposal, DEFAULT_PROPOSAL.to_string()),
            (CallPurpose::SimplifiedProposal, DEFAULT_PROPOSAL.to_string()),
            (CallPurpose::Critique, DEFAULT_CRITIQUE.to_string()),
            (CallPurpose::Moderation, DEFAULT_MODERATION.to_string()),
        ]);
        Self {
            scripts: Mutex::new(HashMap::new()),
            defaults,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue responses for one purpose, consumed in order.
    pub fn script<I>(self, purpose: CallPurpose, responses: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ProviderError>>,
    {
        lock(&self.scripts)
            .entry(purpose)
            .or_default()
            .extend(responses);
        self
    }

    /// Queue a sequence of successful texts.
    pub fn replies(self, purpose: CallPurpose, texts: &[&str]) -> Self {
        self.script(purpose, texts.iter().map(|t| Ok(t.to_string())))
    }

    /// Replace the default answer for a purpose.
    pub fn with_default(mut self, purpose: CallPurpose, text: impl Into<String>) -> Self {
        self.defaults.insert(purpose, text.into());
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, purpose: CallPurpose) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.purpose == purpose)
            .count()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        lock(&self.calls).push(request.clone());
        let scripted = lock(&self.scripts)
            .get_mut(&request.purpose)
            .and_then(|q| q.pop_front());
        match scripted {
            Some(result) => result,
            None => Ok(self
                .defaults
                .get(&request.purpose)
                .cloned()
                .unwrap_or_default()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Tool provider returning fixed results.
#[derive(Default)]
pub struct StaticTools {
    pub results: SearchResults,
    pub events: EventList,
    pub created: Mutex<Vec<EventAck>>,
}

#[async_trait]
impl SearchProvider for StaticTools {
    async fn search(&self, _query: &str) -> Result<SearchResults, ToolError> {
        Ok(self.results.clone())
    }
}

#[async_trait]
impl CalendarProvider for StaticTools {
    async fn list_events(&self, _window: EventWindow) -> Result<EventList, ToolError> {
        Ok(self.events.clone())
    }

    async fn create_event(
        &self,
        summary: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<EventAck, ToolError> {
        let mut created = lock(&self.created);
        let ack = EventAck {
            id: format!("static-{}", created.len() + 1),
            summary: summary.to_string(),
        };
        created.push(ack.clone());
        Ok(ack)
    }
}

/// Tool provider whose every call fails.
pub struct FailingTools(pub String);

#[async_trait]
impl SearchProvider for FailingTools {
    async fn search(&self, _query: &str) -> Result<SearchResults, ToolError> {
        Err(ToolError::Unavailable(self.0.clone()))
    }
}

#[async_trait]
impl CalendarProvider for FailingTools {
    async fn list_events(&self, _window: EventWindow) -> Result<EventList, ToolError> {
        Err(ToolError::Unavailable(self.0.clone()))
    }

    async fn create_event(
        &self,
        _summary: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<EventAck, ToolError> {
        Err(ToolError::Unavailable(self.0.clone()))
    }
}
