pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::models::{
    DemoRequest, JobKind, JobProgress, JobStatus, MappingSet, PatternMapping, ReportRequest,
    ReportSchedule, Task, TaskMapping, TaskState,
};

pub use http::HttpDashboardApi;

/// Network collaborator for the dashboard server.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>, ApiError>;
    async fn get_task(&self, task_id: &str) -> Result<Task, ApiError>;
    async fn import_task(&self, task_id: &str) -> Result<Task, ApiError>;
    async fn update_description(&self, task_id: &str, description: &str) -> Result<(), ApiError>;
    async fn delete_task(&self, task_id: &str) -> Result<(), ApiError>;

    async fn start_report(&self, kind: JobKind, request: &ReportRequest) -> Result<String, ApiError>;
    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, ApiError>;
    async fn list_schedules(&self) -> Result<Vec<ReportSchedule>, ApiError>;
    async fn delete_schedule(&self, schedule_id: &str) -> Result<(), ApiError>;

    /// Returns the slug the server assigned to the new demo.
    async fn create_demo(&self, request: &DemoRequest) -> Result<String, ApiError>;
    async fn demo_status(&self, slug: &str) -> Result<JobStatusReport, ApiError>;
    async fn slug_available(&self, slug: &str) -> Result<bool, ApiError>;

    async fn health(&self) -> Result<HealthReport, ApiError>;

    async fn list_mappings(&self) -> Result<MappingSet, ApiError>;
    async fn save_pattern_mapping(&self, mapping: &PatternMapping) -> Result<(), ApiError>;
    async fn save_task_mapping(&self, mapping: &TaskMapping) -> Result<(), ApiError>;
    async fn delete_pattern_mapping(&self, pattern: &str) -> Result<(), ApiError>;
    async fn delete_task_mapping(&self, task_id: &str) -> Result<(), ApiError>;

    async fn webhook_enabled(&self) -> Result<bool, ApiError>;
    async fn set_webhook_enabled(&self, enabled: bool) -> Result<(), ApiError>;
    /// Flips the webhook and returns the new state.
    async fn toggle_webhook(&self) -> Result<bool, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub error: Option<String>,
    pub progress: Option<JobProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub integration_status: String,
    pub timestamp: Option<String>,
}

/// Task payload as the server sends it. Everything except the id is loose.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireTask {
    #[serde(default)]
    task_id: Option<Value>,
    #[serde(default)]
    task_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    branch_name: Option<String>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    updated_at: Option<Value>,
}

impl WireTask {
    /// Returns `None` for entries without a usable id.
    pub(crate) fn sanitize(self) -> Option<Task> {
        let task_id = match self.task_id? {
            Value::String(id) => non_blank(Some(id))?,
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        Some(Task {
            task_name: non_blank(self.task_name).unwrap_or_else(|| task_id.clone()),
            task_id,
            description: non_blank(self.description),
            state: TaskState::from(non_blank(self.state).unwrap_or_else(|| "in_progress".to_owned())),
            client_name: non_blank(self.client_name),
            branch_name: non_blank(self.branch_name),
            created_at: parse_timestamp(self.created_at),
            updated_at: parse_timestamp(self.updated_at),
        })
    }
}

pub(crate) fn sanitize_tasks(raw: Vec<WireTask>) -> Vec<Task> {
    let total = raw.len();
    let tasks: Vec<Task> = raw.into_iter().filter_map(WireTask::sanitize).collect();
    if tasks.len() != total {
        log::warn!("dropped {} task(s) without an id", total - tasks.len());
    }
    tasks
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

/// Accepts RFC 3339 strings or epoch milliseconds.
fn parse_timestamp(value: Option<Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|at| at.with_timezone(&Utc)),
        Value::Number(millis) => millis.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireJobStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

impl From<WireJobStatus> for JobStatusReport {
    fn from(wire: WireJobStatus) -> Self {
        let status = wire
            .status
            .as_deref()
            .map(JobStatus::from_wire)
            .unwrap_or(JobStatus::Running);
        let error = match wire.error {
            Some(Value::String(text)) => non_blank(Some(text)),
            Some(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
            _ => None,
        }
        .or_else(|| {
            if status == JobStatus::Failed {
                non_blank(wire.message)
            } else {
                None
            }
        });
        Self {
            status,
            error,
            progress: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireDemoStatus {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    current_step: Option<u32>,
    #[serde(default)]
    total_steps: Option<u32>,
}

impl From<WireDemoStatus> for JobStatusReport {
    fn from(wire: WireDemoStatus) -> Self {
        let stage = non_blank(wire.state).unwrap_or_else(|| "starting".to_owned());
        let status = JobStatus::from_demo_state(&stage);
        let error = if status == JobStatus::Failed {
            non_blank(wire.message)
        } else {
            None
        };
        let progress = match (wire.current_step, wire.total_steps) {
            (Some(current_step), Some(total_steps)) if total_steps > 0 => Some(JobProgress {
                stage,
                current_step: current_step.min(total_steps),
                total_steps,
            }),
            _ => None,
        };
        Self {
            status,
            error,
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(value: Value) -> Vec<WireTask> {
        serde_json::from_value(value).expect("wire payload")
    }

    #[test]
    fn blank_fields_and_bad_timestamps_are_dropped() {
        let tasks = sanitize_tasks(wire(json!([{
            "taskId": "86a1",
            "taskName": "  Homepage refresh ",
            "state": "testing",
            "clientName": "   ",
            "branchName": "",
            "createdAt": "not a date",
            "updatedAt": "2025-03-01T10:00:00Z"
        }])));

        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.task_name, "Homepage refresh");
        assert_eq!(task.state, TaskState::Testing);
        assert_eq!(task.client_name, None);
        assert_eq!(task.branch_name, None);
        assert_eq!(task.created_at, None);
        assert_eq!(
            task.updated_at.map(|at| at.timestamp()),
            Some(1_740_823_200)
        );
    }

    #[test]
    fn entries_without_id_are_skipped_and_numeric_ids_kept() {
        let tasks = sanitize_tasks(wire(json!([
            { "taskName": "orphan" },
            { "taskId": "  ", "taskName": "blank" },
            { "taskId": 42, "updatedAt": 1_700_000_000_000i64 }
        ])));

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_id, "42");
        assert_eq!(tasks[0].task_name, "42");
        assert_eq!(tasks[0].state, TaskState::InProgress);
        assert_eq!(tasks[0].updated_at.map(|at| at.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn job_status_error_message_is_extracted() {
        let failed: WireJobStatus =
            serde_json::from_value(json!({ "status": "failed", "error": { "message": "lighthouse crashed" } }))
                .expect("status payload");
        let report = JobStatusReport::from(failed);
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("lighthouse crashed"));

        let running: WireJobStatus =
            serde_json::from_value(json!({ "status": "running", "message": "50%" })).expect("status payload");
        let report = JobStatusReport::from(running);
        assert_eq!(report.status, JobStatus::Running);
        assert_eq!(report.error, None);
    }

    #[test]
    fn demo_status_carries_step_progress() {
        let building: WireDemoStatus = serde_json::from_value(json!({
            "state": "installing",
            "message": "npm install",
            "logs": ["cloned"],
            "currentStep": 3,
            "totalSteps": 7
        }))
        .expect("demo payload");
        let report = JobStatusReport::from(building);
        assert_eq!(report.status, JobStatus::Running);
        assert_eq!(report.error, None);
        assert_eq!(
            report.progress.map(|progress| progress.to_string()).as_deref(),
            Some("3/7 installing")
        );

        let failed: WireDemoStatus =
            serde_json::from_value(json!({ "state": "failed", "message": "clone refused" }))
                .expect("demo payload");
        let report = JobStatusReport::from(failed);
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("clone refused"));
        assert_eq!(report.progress, None);
    }
}
