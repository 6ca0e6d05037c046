use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::api::{DashboardApi, HealthReport, JobStatusReport};
use crate::error::ApiError;
use crate::models::{
    DemoRequest, JobKind, JobProgress, JobStatus, MappingSet, PatternMapping, ReportRequest, ReportSchedule, Task,
    TaskMapping, TaskState,
};
use crate::render::{DashboardEvent, JobEvent, NotificationLevel, RenderSink, TaskView};

pub fn task(id: &str, name: &str, updated_secs: i64) -> Task {
    let at = DateTime::<Utc>::from_timestamp(updated_secs, 0);
    Task {
        task_id: id.to_owned(),
        task_name: name.to_owned(),
        description: None,
        state: TaskState::InProgress,
        client_name: None,
        branch_name: None,
        created_at: at,
        updated_at: at,
    }
}

pub fn server_error(message: &str) -> ApiError {
    ApiError::with_status(500, message)
}

pub enum Scripted<T> {
    Ready(Result<T, ApiError>),
    Gated(oneshot::Receiver<Result<T, ApiError>>),
}

impl<T> Scripted<T> {
    async fn resolve(self) -> Result<T, ApiError> {
        match self {
            Scripted::Ready(result) => result,
            Scripted::Gated(receiver) => receiver
                .await
                .unwrap_or_else(|_| Err(ApiError::transport("gate dropped"))),
        }
    }
}

/// Scripted stand-in for the dashboard server. One-off responses are queued
/// per endpoint; once a queue is empty the steady-state answer is used.
pub struct FakeApi {
    steady_tasks: Mutex<Result<Vec<Task>, ApiError>>,
    queued_tasks: Mutex<VecDeque<Scripted<Vec<Task>>>>,
    job_statuses: Mutex<HashMap<String, VecDeque<Scripted<JobStatusReport>>>>,
    report_starts: Mutex<VecDeque<Scripted<String>>>,
    taken_slugs: Mutex<HashSet<String>>,
    health: Mutex<VecDeque<Scripted<HealthReport>>>,
    steady_health: Mutex<Result<HealthReport, ApiError>>,
    mutations: Mutex<Vec<String>>,
    pub list_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub health_calls: AtomicUsize,
    next_job: AtomicUsize,
    webhook: AtomicBool,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            steady_tasks: Mutex::new(Ok(Vec::new())),
            queued_tasks: Mutex::new(VecDeque::new()),
            job_statuses: Mutex::new(HashMap::new()),
            report_starts: Mutex::new(VecDeque::new()),
            taken_slugs: Mutex::new(HashSet::new()),
            health: Mutex::new(VecDeque::new()),
            steady_health: Mutex::new(Ok(health_report("connected"))),
            mutations: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            next_job: AtomicUsize::new(0),
            webhook: AtomicBool::new(true),
        }
    }
}

pub fn health_report(status: &str) -> HealthReport {
    HealthReport {
        integration_status: status.to_owned(),
        timestamp: Some("2025-03-01T10:00:00Z".to_owned()),
    }
}

pub fn job_report(status: JobStatus, error: Option<&str>) -> JobStatusReport {
    JobStatusReport {
        status,
        error: error.map(str::to_owned),
        progress: None,
    }
}

pub fn demo_report(status: JobStatus, stage: &str, current_step: u32) -> JobStatusReport {
    JobStatusReport {
        status,
        error: None,
        progress: Some(JobProgress {
            stage: stage.to_owned(),
            current_step,
            total_steps: 7,
        }),
    }
}

impl FakeApi {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let api = Self::default();
        api.set_tasks(tasks);
        api
    }

    pub fn set_tasks(&self, tasks: Vec<Task>) {
        *self.steady_tasks.lock().unwrap() = Ok(tasks);
    }

    pub fn fail_tasks(&self, error: ApiError) {
        *self.steady_tasks.lock().unwrap() = Err(error);
    }

    pub fn queue_tasks(&self, response: Result<Vec<Task>, ApiError>) {
        self.queued_tasks
            .lock()
            .unwrap()
            .push_back(Scripted::Ready(response));
    }

    /// Queues a task list response that resolves only when the returned
    /// sender fires.
    pub fn gate_tasks(&self) -> oneshot::Sender<Result<Vec<Task>, ApiError>> {
        let (sender, receiver) = oneshot::channel();
        self.queued_tasks
            .lock()
            .unwrap()
            .push_back(Scripted::Gated(receiver));
        sender
    }

    pub fn queue_job_status(&self, job_id: &str, response: Result<JobStatusReport, ApiError>) {
        self.job_statuses
            .lock()
            .unwrap()
            .entry(job_id.to_owned())
            .or_default()
            .push_back(Scripted::Ready(response));
    }

    pub fn gate_job_status(&self, job_id: &str) -> oneshot::Sender<Result<JobStatusReport, ApiError>> {
        let (sender, receiver) = oneshot::channel();
        self.job_statuses
            .lock()
            .unwrap()
            .entry(job_id.to_owned())
            .or_default()
            .push_back(Scripted::Gated(receiver));
        sender
    }

    /// Also answers demo creation, which shares the start queue.
    pub fn queue_report_start(&self, response: Result<String, ApiError>) {
        self.report_starts
            .lock()
            .unwrap()
            .push_back(Scripted::Ready(response));
    }

    pub fn gate_report_start(&self) -> oneshot::Sender<Result<String, ApiError>> {
        let (sender, receiver) = oneshot::channel();
        self.report_starts
            .lock()
            .unwrap()
            .push_back(Scripted::Gated(receiver));
        sender
    }

    pub fn take_slug(&self, slug: &str) {
        self.taken_slugs.lock().unwrap().insert(slug.to_owned());
    }

    pub fn queue_health(&self, response: Result<HealthReport, ApiError>) {
        self.health
            .lock()
            .unwrap()
            .push_back(Scripted::Ready(response));
    }

    pub fn gate_health(&self) -> oneshot::Sender<Result<HealthReport, ApiError>> {
        let (sender, receiver) = oneshot::channel();
        self.health
            .lock()
            .unwrap()
            .push_back(Scripted::Gated(receiver));
        sender
    }

    pub fn set_health(&self, response: Result<HealthReport, ApiError>) {
        *self.steady_health.lock().unwrap() = response;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.mutations.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DashboardApi for FakeApi {
    async fn list_tasks(&self) -> Result<Vec<Task>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.queued_tasks.lock().unwrap().pop_front();
        match queued {
            Some(scripted) => scripted.resolve().await,
            None => self.steady_tasks.lock().unwrap().clone(),
        }
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, ApiError> {
        let tasks = self.steady_tasks.lock().unwrap().clone()?;
        tasks
            .into_iter()
            .find(|task| task.task_id == task_id)
            .ok_or_else(|| ApiError::with_status(404, "Task not found"))
    }

    async fn import_task(&self, task_id: &str) -> Result<Task, ApiError> {
        self.record(format!("import {task_id}"));
        Ok(task(task_id, task_id, 0))
    }

    async fn update_description(&self, task_id: &str, description: &str) -> Result<(), ApiError> {
        self.record(format!("describe {task_id} {description}"));
        Ok(())
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), ApiError> {
        self.record(format!("delete {task_id}"));
        Ok(())
    }

    async fn start_report(&self, kind: JobKind, request: &ReportRequest) -> Result<String, ApiError> {
        self.record(format!("report {kind} {}", request.url));
        let queued = self.report_starts.lock().unwrap().pop_front();
        if let Some(scripted) = queued {
            return scripted.resolve().await;
        }
        let n = self.next_job.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("job-{n}"))
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self
            .job_statuses
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(scripted) => scripted.resolve().await,
            None => Ok(job_report(JobStatus::Running, None)),
        }
    }

    async fn list_schedules(&self) -> Result<Vec<ReportSchedule>, ApiError> {
        Ok(Vec::new())
    }

    async fn delete_schedule(&self, schedule_id: &str) -> Result<(), ApiError> {
        self.record(format!("unschedule {schedule_id}"));
        Ok(())
    }

    async fn create_demo(&self, request: &DemoRequest) -> Result<String, ApiError> {
        self.record(format!("demo {}", request.business_name));
        let queued = self.report_starts.lock().unwrap().pop_front();
        if let Some(scripted) = queued {
            return scripted.resolve().await;
        }
        let n = self.next_job.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(request.slug.clone().unwrap_or_else(|| format!("demo-{n}")))
    }

    async fn demo_status(&self, slug: &str) -> Result<JobStatusReport, ApiError> {
        self.job_status(slug).await
    }

    async fn slug_available(&self, slug: &str) -> Result<bool, ApiError> {
        Ok(!self.taken_slugs.lock().unwrap().contains(slug))
    }

    async fn health(&self) -> Result<HealthReport, ApiError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.health.lock().unwrap().pop_front();
        match queued {
            Some(scripted) => scripted.resolve().await,
            None => self.steady_health.lock().unwrap().clone(),
        }
    }

    async fn list_mappings(&self) -> Result<MappingSet, ApiError> {
        Ok(MappingSet::default())
    }

    async fn save_pattern_mapping(&self, mapping: &PatternMapping) -> Result<(), ApiError> {
        self.record(format!("pattern {} -> {}", mapping.pattern, mapping.client_name));
        Ok(())
    }

    async fn save_task_mapping(&self, mapping: &TaskMapping) -> Result<(), ApiError> {
        self.record(format!("task {} -> {}", mapping.task_id, mapping.client_name));
        Ok(())
    }

    async fn delete_pattern_mapping(&self, pattern: &str) -> Result<(), ApiError> {
        self.record(format!("unmap pattern {pattern}"));
        Ok(())
    }

    async fn delete_task_mapping(&self, task_id: &str) -> Result<(), ApiError> {
        self.record(format!("unmap task {task_id}"));
        Ok(())
    }

    async fn webhook_enabled(&self) -> Result<bool, ApiError> {
        Ok(self.webhook.load(Ordering::SeqCst))
    }

    async fn set_webhook_enabled(&self, enabled: bool) -> Result<(), ApiError> {
        self.record(format!("webhook {enabled}"));
        self.webhook.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    async fn toggle_webhook(&self) -> Result<bool, ApiError> {
        let enabled = !self.webhook.fetch_xor(true, Ordering::SeqCst);
        self.record(format!("webhook {enabled}"));
        Ok(enabled)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DashboardEvent>>,
}

impl RenderSink for RecordingSink {
    fn publish(&self, event: DashboardEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl RecordingSink {
    pub fn events(&self) -> Vec<DashboardEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn renders(&self) -> Vec<TaskView> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DashboardEvent::Tasks(view) => Some(view),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self, level: NotificationLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DashboardEvent::Notification(note) if note.level == level => Some(note.message),
                _ => None,
            })
            .collect()
    }

    pub fn job_events(&self) -> Vec<JobEvent> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DashboardEvent::Job(job) => Some(job),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}
