//! Grounding context captured once per question.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tools::{EventList, SearchResults};

/// Number of calendar events shown to the critic.
pub const CRITIC_EVENT_LIMIT: usize = 10;

/// Inline failure marker for one source: serializes as `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceError {
    pub error: String,
}

/// Result of querying one tool provider: the payload or an error marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSlot<T> {
    Failed(SourceError),
    Loaded(T),
}

impl<T> SourceSlot<T> {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(SourceError {
            error: message.into(),
        })
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(e) => Some(e.error.as_str()),
            Self::Loaded(_) => None,
        }
    }
}

/// Snapshot of everything the gatherer fetched for the current question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub search_results: SourceSlot<SearchResults>,
    pub calendar_events: SourceSlot<EventList>,
    /// Empty when no lookup was needed or the lookup failed.
    pub web_findings: String,
    pub fetched_at: DateTime<Utc>,
    /// Degraded-mode notes recorded while gathering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ContextSnapshot {
    /// One-line count summary used for the gatherer's turn.
    pub fn summary(&self) -> String {
        let search = match &self.search_results {
            SourceSlot::Loaded(r) => format!("{} workspace matches", r.total),
            SourceSlot::Failed(e) => format!("search unavailable ({})", e.error),
        };
        let calendar = match &self.calendar_events {
            SourceSlot::Loaded(ev) => format!("{} upcoming events", ev.total),
            SourceSlot::Failed(e) => format!("calendar unavailable ({})", e.error),
        };
        let web = if self.web_findings.is_empty() {
            "no web findings".to_string()
        } else {
            format!("web findings ({} chars)", self.web_findings.chars().count())
        };
        let mut line = format!("Context gathered: {search}; {calendar}; {web}.");
        if !self.notes.is_empty() {
            line.push_str(&format!(" Notes: {}", self.notes.join("; ")));
        }
        line
    }

    /// Explicit rendering handed to the critic as a final message.
    pub fn critic_brief(&self) -> String {
        let search = pretty(&self.search_results);
        let calendar = match &self.calendar_events {
            SourceSlot::Loaded(list) => {
                let head: Vec<_> = list.events.iter().take(CRITIC_EVENT_LIMIT).collect();
                serde_json::to_string_pretty(&head).unwrap_or_else(|_| "[]".to_string())
            }
            failed => pretty(failed),
        };
        let web = if self.web_findings.is_empty() {
            "(none)"
        } else {
            self.web_findings.as_str()
        };
        let mut brief = format!(
            "REAL-TIME CONTEXT (fetched {}):\n\nWorkspace search results:\n{}\n\nUpcoming calendar events:\n{}\n\nWeb findings:\n{}",
            self.fetched_at.format("%Y-%m-%d %H:%M UTC"),
            search,
            calendar,
            web
        );
        if !self.notes.is_empty() {
            brief.push_str("\n\nGathering notes:");
            for note in &self.notes {
                brief.push_str("\n- ");
                brief.push_str(note);
            }
        }
        brief
    }
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}
