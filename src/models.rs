use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DashError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskState {
    InProgress,
    AwaitingApproval,
    Testing,
    Completed,
    Other(String),
}

impl TaskState {
    pub fn as_str(&self) -> &str {
        match self {
            TaskState::InProgress => "in_progress",
            TaskState::AwaitingApproval => "awaiting_approval",
            TaskState::Testing => "testing",
            TaskState::Completed => "completed",
            TaskState::Other(raw) => raw,
        }
    }
}

impl From<String> for TaskState {
    fn from(raw: String) -> Self {
        match raw.trim() {
            "in_progress" => TaskState::InProgress,
            "awaiting_approval" => TaskState::AwaitingApproval,
            "testing" => TaskState::Testing,
            "completed" => TaskState::Completed,
            other => TaskState::Other(other.to_owned()),
        }
    }
}

impl From<TaskState> for String {
    fn from(state: TaskState) -> Self {
        state.as_str().to_owned()
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task as held in the local snapshot. Only ever built from a sanitized
/// server payload, so optional strings are never blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    pub task_name: String,
    pub description: Option<String>,
    pub state: TaskState,
    pub client_name: Option<String>,
    pub branch_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(TaskState),
}

impl FromStr for StatusFilter {
    type Err = DashError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(DashError::Validation("filter cannot be empty".to_owned()));
        }
        if value.eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        Ok(StatusFilter::Only(TaskState::from(value.to_owned())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortField {
    Updated,
    Created,
    Name,
    Client,
    State,
    /// Kept as-is; sorting by it leaves the order untouched.
    Unrecognized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortKey {
    fn default() -> Self {
        Self {
            field: SortField::Updated,
            direction: SortDirection::Desc,
        }
    }
}

impl SortKey {
    /// Parses `<field>_<asc|desc>`; a missing direction means descending.
    pub fn parse(raw: &str) -> Self {
        let value = raw.trim().to_lowercase();
        let (field, direction) = match value.rsplit_once('_') {
            Some((field, "asc")) => (field.to_owned(), SortDirection::Asc),
            Some((field, "desc")) => (field.to_owned(), SortDirection::Desc),
            _ => (value, SortDirection::Desc),
        };
        let field = match field.as_str() {
            "updated" => SortField::Updated,
            "created" => SortField::Created,
            "name" => SortField::Name,
            "client" => SortField::Client,
            "state" => SortField::State,
            _ => SortField::Unrecognized(field),
        };
        Self { field, direction }
    }
}

/// User-controlled view over the snapshot. Search text is stored trimmed and
/// lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewState {
    pub filter: StatusFilter,
    search: String,
    pub sort: SortKey,
}

impl ViewState {
    pub fn new(filter: StatusFilter, search: &str, sort: SortKey) -> Self {
        let mut view = Self {
            filter,
            search: String::new(),
            sort,
        };
        view.set_search(search);
        view
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, raw: &str) {
        self.search = raw.trim().to_lowercase();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGroup {
    pub client_name: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Performance,
    Security,
    /// Demo site build, tracked by its client slug.
    Demo,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Performance => "performance",
            JobKind::Security => "security",
            JobKind::Demo => "demo",
        }
    }
}

/// Parses report kinds only; demos are started from a [`DemoRequest`].
impl FromStr for JobKind {
    type Err = DashError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "performance" | "perf" => Ok(JobKind::Performance),
            "security" | "sec" => Ok(JobKind::Security),
            other => Err(DashError::Validation(format!(
                "unknown report kind '{other}', expected performance or security"
            ))),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
    /// Polling itself broke; no verdict from the server.
    Aborted,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Aborted)
    }

    /// Maps a server-reported status string. Unknown values are treated as
    /// still running so the job keeps being polled.
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "queued" | "pending" => JobStatus::Queued,
            "done" | "completed" | "complete" | "success" => JobStatus::Done,
            "failed" | "error" => JobStatus::Failed,
            _ => JobStatus::Running,
        }
    }

    /// Maps a demo build state. A demo whose site is running is finished
    /// as far as tracking goes.
    pub fn from_demo_state(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "starting" => JobStatus::Queued,
            "running" | "completed" => JobStatus::Done,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Running,
        }
    }
}

/// Step counter reported while a demo is being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub stage: String,
    pub current_step: u32,
    pub total_steps: u32,
}

impl fmt::Display for JobProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.current_step, self.total_steps, self.stage)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoRequest {
    pub business_name: String,
    pub primary_color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_repo_url: Option<String>,
    /// Server picks one from the business name when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Expired,
    Disconnected,
    Offline,
}

impl ConnectionStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "connected" => ConnectionStatus::Connected,
            "expired" | "token_expired" => ConnectionStatus::Expired,
            _ => ConnectionStatus::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Expired => "expired",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Offline => "offline",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSchedule {
    pub id: String,
    pub kind: JobKind,
    pub url: String,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMapping {
    pub pattern: String,
    pub client_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMapping {
    pub task_id: String,
    pub client_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingSet {
    #[serde(default)]
    pub patterns: Vec<PatternMapping>,
    #[serde(default)]
    pub tasks: Vec<TaskMapping>,
}
