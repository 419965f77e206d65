//! Tool provider interfaces used to ground a debate in the user's own data.
//!
//! Implementations live outside this crate (see `roundtable::workspace`);
//! the context gatherer only sees these traits.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Error from a tool provider. Always reported inline, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("tool unavailable: {0}")]
    Unavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Other(String),
}

/// Kind of document a search hit refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitKind {
    Project,
    Task,
    Note,
}

/// One document matched by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "type")]
    pub kind: HitKind,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub results: Vec<SearchHit>,
    pub total: usize,
}

impl SearchResults {
    pub fn new(results: Vec<SearchHit>) -> Self {
        let total = results.len();
        Self { results, total }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventList {
    pub events: Vec<CalendarEvent>,
    pub total: usize,
}

impl EventList {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        let total = events.len();
        Self { events, total }
    }
}

/// Half-open time window `[start, end)` for calendar listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EventWindow {
    /// Window length used by the context gatherer.
    pub const LOOKAHEAD_DAYS: i64 = 30;

    pub fn next_days(from: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: from,
            end: from + Duration::days(days),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Acknowledgement returned by [`CalendarProvider::create_event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAck {
    pub id: String,
    pub summary: String,
}

/// Document search over the user's workspace.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResults, ToolError>;
}

/// Calendar access.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn list_events(&self, window: EventWindow) -> Result<EventList, ToolError>;

    async fn create_event(
        &self,
        summary: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<EventAck, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_half_open() {
        let now = Utc::now();
        let window = EventWindow::next_days(now, 30);
        assert!(window.contains(now));
        assert!(window.contains(now + Duration::days(29)));
        assert!(!window.contains(now + Duration::days(30)));
        assert!(!window.contains(now - Duration::seconds(1)));
    }

    #[test]
    fn test_search_hit_serializes_type_field() {
        let hit = SearchHit {
            kind: HitKind::Note,
            data: serde_json::json!({"id": "note-001"}),
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["type"], "note");
        assert_eq!(json["data"]["id"], "note-001");
    }

    #[test]
    fn test_totals_follow_contents() {
        assert_eq!(SearchResults::new(vec![]).total, 0);
        let ev = CalendarEvent {
            id: "e1".into(),
            title: "Standup".into(),
            start: Utc::now(),
            end: None,
            kind: None,
        };
        assert_eq!(EventList::new(vec![ev.clone(), ev]).total, 2);
    }
}
