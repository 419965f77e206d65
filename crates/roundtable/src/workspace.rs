//! Local workspace: projects, tasks, notes and calendar events.
//!
//! Loaded from a JSON file or seeded with a demo workspace. Serves both
//! tool interfaces the context gatherer consumes. Events created through
//! [`CalendarProvider::create_event`] live in memory for the process lifetime.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use coordination::tools::{
    CalendarEvent, EventAck, EventList, HitKind, SearchHit, SearchResults,
};
use coordination::{CalendarProvider, EventWindow, SearchProvider, ToolError};

/// Query terms shorter than this are ignored by keyword matching.
const MIN_TERM_LEN: usize = 4;

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "could", "does", "from", "have", "into", "just", "more",
    "next", "only", "should", "some", "than", "that", "their", "them", "then", "there", "these",
    "they", "this", "what", "when", "where", "which", "will", "with", "would", "your",
];

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to read workspace {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse workspace {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// On-disk workspace document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceData {
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub notes: Vec<Note>,
    pub events: Vec<CalendarEvent>,
}

pub struct LocalWorkspace {
    data: WorkspaceData,
    created: Mutex<Vec<CalendarEvent>>,
}

impl LocalWorkspace {
    pub fn new(data: WorkspaceData) -> Self {
        Self {
            data,
            created: Mutex::new(Vec::new()),
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self, WorkspaceError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| WorkspaceError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let data: WorkspaceData =
            serde_json::from_str(&content).map_err(|source| WorkspaceError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            path = %path.display(),
            projects = data.projects.len(),
            tasks = data.tasks.len(),
            notes = data.notes.len(),
            events = data.events.len(),
            "workspace loaded"
        );
        Ok(Self::new(data))
    }

    /// Demo workspace with events laid out over the 30 days after `now`.
    pub fn demo(now: DateTime<Utc>) -> Self {
        Self::new(demo_data(now))
    }

    pub fn data(&self) -> &WorkspaceData {
        &self.data
    }

    fn created(&self) -> MutexGuard<'_, Vec<CalendarEvent>> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lowercased search terms: the whole query plus its significant words.
fn query_terms(query: &str) -> Vec<String> {
    let whole = query.trim().to_lowercase();
    if whole.is_empty() {
        return Vec::new();
    }
    let mut terms = vec![whole.clone()];
    for word in whole.split(|c: char| !c.is_alphanumeric()) {
        if word.chars().count() >= MIN_TERM_LEN
            && !STOPWORDS.contains(&word)
            && !terms.iter().any(|t| t == word)
        {
            terms.push(word.to_string());
        }
    }
    terms
}

fn matches(terms: &[String], fields: &[&str]) -> bool {
    fields.iter().any(|field| {
        let field = field.to_lowercase();
        terms.iter().any(|t| field.contains(t.as_str()))
    })
}

fn hit<T: Serialize>(kind: HitKind, item: &T) -> Result<SearchHit, ToolError> {
    let data = serde_json::to_value(item).map_err(|e| ToolError::Other(e.to_string()))?;
    Ok(SearchHit { kind, data })
}

#[async_trait]
impl SearchProvider for LocalWorkspace {
    async fn search(&self, query: &str) -> Result<SearchResults, ToolError> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Err(ToolError::InvalidInput("empty search query".to_string()));
        }

        let mut results = Vec::new();
        for project in &self.data.projects {
            if matches(&terms, &[&project.title, &project.description]) {
                results.push(hit(HitKind::Project, project)?);
            }
        }
        for task in &self.data.tasks {
            if matches(&terms, &[&task.title]) {
                results.push(hit(HitKind::Task, task)?);
            }
        }
        for note in &self.data.notes {
            if matches(&terms, &[&note.title, &note.content]) {
                results.push(hit(HitKind::Note, note)?);
            }
        }
        debug!(terms = terms.len(), hits = results.len(), "workspace search");
        Ok(SearchResults::new(results))
    }
}

#[async_trait]
impl CalendarProvider for LocalWorkspace {
    async fn list_events(&self, window: EventWindow) -> Result<EventList, ToolError> {
        let mut events: Vec<CalendarEvent> = self
            .data
            .events
            .iter()
            .chain(self.created().iter())
            .filter(|e| window.contains(e.start))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start);
        Ok(EventList::new(events))
    }

    async fn create_event(
        &self,
        summary: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<EventAck, ToolError> {
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(ToolError::InvalidInput("event summary is empty".to_string()));
        }
        if end <= start {
            return Err(ToolError::InvalidInput(format!(
                "event must end after it starts ({start} >= {end})"
            )));
        }

        let mut created = self.created();
        let id = format!("event-local-{}", created.len() + 1);
        created.push(CalendarEvent {
            id: id.clone(),
            title: summary.to_string(),
            start,
            end: Some(end),
            kind: Some("Scheduled".to_string()),
        });
        info!(%id, %start, %end, "event created");
        Ok(EventAck {
            id,
            summary: summary.to_string(),
        })
    }
}

/// `now`'s date shifted by `days`, at `hour:minute` UTC.
fn at(now: DateTime<Utc>, days: i64, hour: u32, minute: u32) -> DateTime<Utc> {
    let date = (now + Duration::days(days)).date_naive();
    match NaiveTime::from_hms_opt(hour, minute, 0) {
        Some(time) => date.and_time(time).and_utc(),
        None => now + Duration::days(days),
    }
}

fn event(
    id: &str,
    title: &str,
    start: DateTime<Utc>,
    length: Duration,
    kind: &str,
) -> CalendarEvent {
    CalendarEvent {
        id: id.to_string(),
        title: title.to_string(),
        start,
        end: Some(start + length),
        kind: Some(kind.to_string()),
    }
}

fn project(
    id: &str,
    title: &str,
    status: &str,
    priority: &str,
    budget: &str,
    deadline: (i32, u32, u32),
    description: &str,
) -> Project {
    Project {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        status: status.to_string(),
        priority: Some(priority.to_string()),
        budget: Some(budget.to_string()),
        deadline: NaiveDate::from_ymd_opt(deadline.0, deadline.1, deadline.2),
    }
}

fn task(id: &str, title: &str, project: &str, due: (i32, u32, u32), status: &str) -> Task {
    Task {
        id: id.to_string(),
        title: title.to_string(),
        project: Some(project.to_string()),
        due: NaiveDate::from_ymd_opt(due.0, due.1, due.2),
        status: status.to_string(),
    }
}

fn note(id: &str, title: &str, content: &str, tags: &[&str]) -> Note {
    Note {
        id: id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn demo_data(now: DateTime<Utc>) -> WorkspaceData {
    let projects = vec![
        project(
            "proj-001",
            "Launch New Product Line",
            "In Progress",
            "High",
            "$150,000",
            (2025, 12, 31),
            "Develop and launch new AI-powered productivity tools",
        ),
        project(
            "proj-002",
            "Complete Online Course",
            "In Progress",
            "Medium",
            "$500",
            (2025, 11, 30),
            "Advanced machine learning specialization",
        ),
        project(
            "proj-003",
            "Home Renovation",
            "Planning",
            "Low",
            "$25,000",
            (2026, 3, 1),
            "Kitchen and bathroom remodeling",
        ),
        project(
            "proj-004",
            "Career Transition Planning",
            "Active",
            "High",
            "$5,000",
            (2026, 1, 15),
            "Transition from corporate to entrepreneurship",
        ),
        project(
            "proj-005",
            "World Travel Adventure",
            "Research",
            "Medium",
            "$35,000",
            (2026, 6, 1),
            "6-month sabbatical traveling through Europe and Asia",
        ),
    ];

    let tasks = vec![
        task("task-001", "Finalize product specs", "Launch New Product Line", (2025, 12, 5), "Todo"),
        task("task-002", "Hire senior developer", "Launch New Product Line", (2025, 12, 10), "In Progress"),
        task("task-003", "Complete module 4 assignments", "Complete Online Course", (2025, 12, 2), "Todo"),
        task("task-004", "Submit final project", "Complete Online Course", (2025, 11, 28), "Urgent"),
        task("task-005", "Get kitchen contractor quotes", "Home Renovation", (2026, 1, 15), "Todo"),
        task("task-006", "Update LinkedIn profile", "Career Transition Planning", (2025, 12, 8), "Todo"),
        task("task-007", "Network with 5 entrepreneurs", "Career Transition Planning", (2025, 12, 15), "In Progress"),
        task("task-008", "Book flights to Europe", "World Travel Adventure", (2026, 2, 1), "Todo"),
    ];

    let notes = vec![
        note(
            "note-001",
            "Goals for 2026",
            "1. Launch successful product\n2. Complete career transition\n3. Take extended sabbatical\n4. Improve work-life balance",
            &["goals", "planning"],
        ),
        note(
            "note-002",
            "Financial Status",
            "Savings: $85,000\nMonthly income: $12,000\nMonthly expenses: $6,500\nInvestment portfolio: $145,000",
            &["finance", "budget"],
        ),
        note(
            "note-003",
            "Sabbatical Planning Notes",
            "Countries to visit: Italy, Greece, Japan, Thailand\nEstimated cost: $35,000\nDuration: 6 months\nTiming: Q2 2026",
            &["travel", "sabbatical"],
        ),
    ];

    // standups Mon/Wed/Fri-style for four weeks, then one-off commitments
    let mut events = Vec::new();
    for week in 0..4 {
        for day in [0, 2, 4] {
            events.push(event(
                &format!("event-standup-w{week}-d{day}"),
                "Team Standup",
                at(now, week * 7 + day, 9, 0),
                Duration::minutes(30),
                "Meeting",
            ));
        }
    }
    events.extend([
        event("event-deadline-1", "Course Final Project Due", at(now, 3, 23, 59), Duration::minutes(1), "Deadline"),
        event("event-deadline-2", "Product Spec Review", at(now, 7, 14, 0), Duration::hours(2), "Meeting"),
        event("event-networking-1", "Coffee with Startup Founder", at(now, 5, 10, 0), Duration::hours(1), "Networking"),
        event("event-personal-1", "Doctor's Appointment", at(now, 9, 15, 30), Duration::hours(1), "Personal"),
        event("event-vacation-1", "Family Holiday Trip", at(now, 25, 0, 0), Duration::days(5), "Vacation"),
    ]);
    events.sort_by_key(|e| e.start);

    WorkspaceData {
        projects,
        tasks,
        notes,
        events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        at(Utc::now(), 0, 6, 0)
    }

    #[test]
    fn test_query_terms_drop_short_and_stopwords() {
        let terms = query_terms("Should I take the sabbatical?");
        assert_eq!(terms[0], "should i take the sabbatical?");
        assert!(terms.contains(&"sabbatical".to_string()));
        assert!(terms.contains(&"take".to_string()));
        assert!(!terms.contains(&"should".to_string()));
        assert!(!terms.contains(&"the".to_string()));
        assert!(query_terms("   ").is_empty());
    }

    #[tokio::test]
    async fn test_search_matches_across_kinds() {
        let ws = LocalWorkspace::demo(now());
        let found = ws.search("Should I take the sabbatical?").await.unwrap();
        let kinds: Vec<HitKind> = found.results.iter().map(|h| h.kind).collect();
        assert!(kinds.contains(&HitKind::Project));
        assert!(kinds.contains(&HitKind::Note));
        assert_eq!(found.total, found.results.len());

        let ids: Vec<&str> = found
            .results
            .iter()
            .filter_map(|h| h.data["id"].as_str())
            .collect();
        assert!(ids.contains(&"proj-005"));
        assert!(ids.contains(&"note-001"));
        assert!(ids.contains(&"note-003"));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_on_whole_query() {
        let ws = LocalWorkspace::demo(now());
        let found = ws.search("HIRE SENIOR").await.unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.results[0].kind, HitKind::Task);
        assert_eq!(found.results[0].data["id"], "task-002");
    }

    #[tokio::test]
    async fn test_search_no_hits() {
        let ws = LocalWorkspace::demo(now());
        let found = ws.search("zebra").await.unwrap();
        assert_eq!(found, SearchResults::new(Vec::new()));
        assert!(ws.search("").await.is_err());
    }

    #[tokio::test]
    async fn test_events_filtered_to_window() {
        let now = now();
        let ws = LocalWorkspace::demo(now);
        let all = ws
            .list_events(EventWindow::next_days(now, EventWindow::LOOKAHEAD_DAYS))
            .await
            .unwrap();
        assert_eq!(all.total, 17);
        assert!(all.events.windows(2).all(|w| w[0].start <= w[1].start));

        let week = ws
            .list_events(EventWindow::next_days(now, 4))
            .await
            .unwrap();
        assert!(week.events.iter().any(|e| e.id == "event-deadline-1"));
        assert!(week.events.iter().all(|e| e.id != "event-deadline-2"));
    }

    #[tokio::test]
    async fn test_created_event_is_listed() {
        let now = now();
        let ws = LocalWorkspace::demo(now);
        let start = at(now, 2, 16, 0);
        let ack = ws
            .create_event("Call the contractor", start, start + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(ack.id, "event-local-1");

        let listed = ws
            .list_events(EventWindow::next_days(now, 3))
            .await
            .unwrap();
        assert!(listed.events.iter().any(|e| e.id == ack.id));
    }

    #[tokio::test]
    async fn test_create_event_rejects_bad_input() {
        let ws = LocalWorkspace::new(WorkspaceData::default());
        let start = now();
        assert!(matches!(
            ws.create_event("x", start, start).await,
            Err(ToolError::InvalidInput(_))
        ));
        assert!(matches!(
            ws.create_event("  ", start, start + Duration::hours(1)).await,
            Err(ToolError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_from_file_round_trips_demo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspace.json");
        let data = demo_data(now());
        std::fs::write(&path, serde_json::to_string_pretty(&data).unwrap()).unwrap();

        let ws = LocalWorkspace::from_file(&path).await.unwrap();
        assert_eq!(ws.data(), &data);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            LocalWorkspace::from_file(&path).await,
            Err(WorkspaceError::Parse { .. })
        ));
        assert!(matches!(
            LocalWorkspace::from_file(&dir.path().join("missing.json")).await,
            Err(WorkspaceError::Io { .. })
        ));
    }
}
