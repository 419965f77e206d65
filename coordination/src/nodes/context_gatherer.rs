//! Context gatherer: grounds the debate before anyone argues.
//!
//! Runs once per question. Every step is best-effort: a failed lookup
//! classification means "no lookup", a failed web lookup leaves the findings
//! empty with a note, and a failed tool call becomes an `{"error": ...}`
//! slot in the snapshot. The node itself never fails.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::{prompts, DebateNode, NodeContext, NodeError, NodeUpdate};
use crate::debate::{AgentRole, ContextSnapshot, DebateState, DebateStatus, SourceSlot, TurnDraft};
use crate::provider::{CallPurpose, ChatMessage, CompletionRequest};
use crate::tools::{CalendarProvider, EventList, EventWindow, SearchProvider, SearchResults};

#[derive(Clone, Default)]
pub struct ContextGatherer {
    search: Option<Arc<dyn SearchProvider>>,
    calendar: Option<Arc<dyn CalendarProvider>>,
}

impl ContextGatherer {
    pub fn new(
        search: Option<Arc<dyn SearchProvider>>,
        calendar: Option<Arc<dyn CalendarProvider>>,
    ) -> Self {
        Self { search, calendar }
    }

    async fn needs_web_lookup(&self, question: &str, ctx: &NodeContext, notes: &mut Vec<String>) -> bool {
        let request = CompletionRequest::new(
            CallPurpose::NeedsWebLookup,
            prompts::LOOKUP_CLASSIFIER,
            ctx.temperatures.context_gatherer,
        )
        .push(ChatMessage::user(prompts::lookup_question(question)));

        match ctx.complete(&request).await {
            Ok(answer) => answer.to_uppercase().contains("YES"),
            Err(e) => {
                warn!(error = %e, "lookup classification failed, assuming no lookup needed");
                notes.push(format!("lookup classification failed: {}", e.last_error));
                false
            }
        }
    }

    async fn web_findings(&self, question: &str, ctx: &NodeContext, notes: &mut Vec<String>) -> String {
        let request = CompletionRequest::new(
            CallPurpose::WebFindings,
            prompts::WEB_RESEARCHER,
            ctx.temperatures.context_gatherer,
        )
        .push(ChatMessage::user(prompts::web_findings_request(question)));

        match ctx.complete(&request).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "web lookup failed, continuing with workspace data only");
                notes.push(format!("web lookup failed: {}", e.last_error));
                String::new()
            }
        }
    }

    async fn search(&self, question: &str) -> SourceSlot<SearchResults> {
        let Some(provider) = &self.search else {
            return SourceSlot::failed("search provider not configured");
        };
        match provider.search(question).await {
            Ok(results) => SourceSlot::Loaded(results),
            Err(e) => {
                warn!(error = %e, "workspace search failed");
                SourceSlot::failed(e.to_string())
            }
        }
    }

    async fn calendar(&self, window: EventWindow) -> SourceSlot<EventList> {
        let Some(provider) = &self.calendar else {
            return SourceSlot::failed("calendar provider not configured");
        };
        match provider.list_events(window).await {
            Ok(events) => SourceSlot::Loaded(events),
            Err(e) => {
                warn!(error = %e, "calendar listing failed");
                SourceSlot::failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl DebateNode for ContextGatherer {
    fn role(&self) -> AgentRole {
        AgentRole::ContextGatherer
    }

    fn name(&self) -> &'static str {
        "context_gatherer"
    }

    async fn run(&self, state: &DebateState, ctx: &NodeContext) -> Result<NodeUpdate, NodeError> {
        let question = state.latest_question().unwrap_or_default();
        let mut notes = Vec::new();

        let web_findings = if self.needs_web_lookup(question, ctx, &mut notes).await {
            self.web_findings(question, ctx, &mut notes).await
        } else {
            String::new()
        };

        let now = Utc::now();
        let window = EventWindow::next_days(now, EventWindow::LOOKAHEAD_DAYS);
        let (search_results, calendar_events) =
            tokio::join!(self.search(question), self.calendar(window));

        let snapshot = ContextSnapshot {
            search_results,
            calendar_events,
            web_findings,
            fetched_at: now,
            notes,
        };
        let summary = snapshot.summary();
        info!(
            search_ok = snapshot.search_results.loaded().is_some(),
            calendar_ok = snapshot.calendar_events.loaded().is_some(),
            web = !snapshot.web_findings.is_empty(),
            "context gathered"
        );

        Ok(NodeUpdate {
            new_turns: vec![TurnDraft::new(AgentRole::ContextGatherer, summary)],
            context_snapshot: Some(snapshot),
            status: Some(DebateStatus::Debating),
            ..NodeUpdate::default()
        })
    }
}
