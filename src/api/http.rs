use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    sanitize_tasks, DashboardApi, HealthReport, JobStatusReport, WireDemoStatus, WireJobStatus, WireTask,
};
use crate::config::Config;
use crate::error::{ApiError, DashError};
use crate::models::{
    DemoRequest, JobKind, MappingSet, PatternMapping, ReportRequest, ReportSchedule, Task, TaskMapping,
};

pub struct HttpDashboardApi {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartedJob {
    job_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedDemo {
    client_slug: String,
}

#[derive(Deserialize)]
struct SlugAvailability {
    available: bool,
}

#[derive(Deserialize)]
struct WebhookToggled {
    #[serde(rename = "newState", alias = "state")]
    enabled: bool,
}

#[derive(Deserialize)]
struct WireHealth {
    #[serde(default)]
    clickup: Option<WireIntegration>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Deserialize)]
struct WireIntegration {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct WebhookState {
    enabled: bool,
}

impl HttpDashboardApi {
    pub fn new(config: &Config) -> Result<Self, DashError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|error| {
            DashError::Configuration(format!("failed to build HTTP client: {error}"))
        })?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Appends `segments` to the base URL; each one is percent-encoded, so
    /// ids containing `/`, `?` or `#` stay inside their segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|error| ApiError::transport(format!("invalid base URL: {error}")))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::transport(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| ApiError::transport(format!("request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| ApiError::transport(format!("response read failed: {error}")))?;

        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &body));
        }
        Ok(body)
    }

    async fn request_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body)
            .map_err(|error| ApiError::transport(format!("response was malformed JSON: {error}")))
    }

    async fn request_status_only(&self, request: RequestBuilder) -> Result<(), ApiError> {
        self.send(request).await.map(|_| ())
    }
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn list_tasks(&self) -> Result<Vec<Task>, ApiError> {
        let raw: Vec<WireTask> = self
            .request_json(self.client.get(self.endpoint(&["api", "tasks"])?))
            .await?;
        Ok(sanitize_tasks(raw))
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, ApiError> {
        let raw: WireTask = self
            .request_json(self.client.get(self.endpoint(&["api", "tasks", task_id])?))
            .await?;
        raw.sanitize()
            .ok_or_else(|| ApiError::transport(format!("task {task_id} came back without an id")))
    }

    async fn import_task(&self, task_id: &str) -> Result<Task, ApiError> {
        let request = self
            .client
            .post(self.endpoint(&["api", "tasks", "import"])?)
            .json(&json!({ "taskId": task_id }));
        let raw: WireTask = self.request_json(request).await?;
        raw.sanitize()
            .ok_or_else(|| ApiError::transport(format!("imported task {task_id} came back without an id")))
    }

    async fn update_description(&self, task_id: &str, description: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .put(self.endpoint(&["api", "tasks", task_id, "description"])?)
            .json(&json!({ "description": description }));
        self.request_status_only(request).await
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), ApiError> {
        let request = self.client.delete(self.endpoint(&["api", "tasks", task_id])?);
        self.request_status_only(request).await
    }

    async fn start_report(&self, kind: JobKind, request: &ReportRequest) -> Result<String, ApiError> {
        let request = self
            .client
            .post(self.endpoint(&["api", "reports", kind.as_str()])?)
            .json(request);
        let started: StartedJob = self.request_json(request).await?;
        Ok(started.job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, ApiError> {
        let wire: WireJobStatus = self
            .request_json(self.client.get(self.endpoint(&["api", "reports", "jobs", job_id])?))
            .await?;
        Ok(wire.into())
    }

    async fn list_schedules(&self) -> Result<Vec<ReportSchedule>, ApiError> {
        self.request_json(self.client.get(self.endpoint(&["api", "reports", "schedules"])?))
            .await
    }

    async fn delete_schedule(&self, schedule_id: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.endpoint(&["api", "reports", "schedules", schedule_id])?);
        self.request_status_only(request).await
    }

    async fn create_demo(&self, request: &DemoRequest) -> Result<String, ApiError> {
        let request = self
            .client
            .post(self.endpoint(&["api", "demo", "create"])?)
            .json(request);
        let created: CreatedDemo = self.request_json(request).await?;
        Ok(created.client_slug)
    }

    async fn demo_status(&self, slug: &str) -> Result<JobStatusReport, ApiError> {
        let wire: WireDemoStatus = self
            .request_json(self.client.get(self.endpoint(&["api", "demo", "status", slug])?))
            .await?;
        Ok(wire.into())
    }

    async fn slug_available(&self, slug: &str) -> Result<bool, ApiError> {
        let request = self
            .client
            .get(self.endpoint(&["api", "demo", "check-slug"])?)
            .query(&[("slug", slug)]);
        let answer: SlugAvailability = self.request_json(request).await?;
        Ok(answer.available)
    }

    async fn health(&self) -> Result<HealthReport, ApiError> {
        let wire: WireHealth = self
            .request_json(self.client.get(self.endpoint(&["api", "health"])?))
            .await?;
        Ok(HealthReport {
            integration_status: wire
                .clickup
                .and_then(|integration| integration.status)
                .unwrap_or_default(),
            timestamp: wire.timestamp,
        })
    }

    async fn list_mappings(&self) -> Result<MappingSet, ApiError> {
        self.request_json(self.client.get(self.endpoint(&["api", "mappings"])?))
            .await
    }

    async fn save_pattern_mapping(&self, mapping: &PatternMapping) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.endpoint(&["api", "mappings", "pattern"])?)
            .json(mapping);
        self.request_status_only(request).await
    }

    async fn save_task_mapping(&self, mapping: &TaskMapping) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.endpoint(&["api", "mappings", "task"])?)
            .json(mapping);
        self.request_status_only(request).await
    }

    async fn delete_pattern_mapping(&self, pattern: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.endpoint(&["api", "mappings", "pattern"])?)
            .query(&[("pattern", pattern)]);
        self.request_status_only(request).await
    }

    async fn delete_task_mapping(&self, task_id: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.endpoint(&["api", "mappings", "task", task_id])?);
        self.request_status_only(request).await
    }

    async fn webhook_enabled(&self) -> Result<bool, ApiError> {
        let state: WebhookState = self
            .request_json(self.client.get(self.endpoint(&["api", "webhook", "status"])?))
            .await?;
        Ok(state.enabled)
    }

    async fn set_webhook_enabled(&self, enabled: bool) -> Result<(), ApiError> {
        let action = if enabled { "enable" } else { "disable" };
        let request = self
            .client
            .post(self.endpoint(&["api", "webhook", action])?)
            .json(&Value::Object(Default::default()));
        self.request_status_only(request).await
    }

    async fn toggle_webhook(&self) -> Result<bool, ApiError> {
        let request = self
            .client
            .post(self.endpoint(&["api", "webhook", "toggle"])?)
            .json(&Value::Object(Default::default()));
        let toggled: WebhookToggled = self.request_json(request).await?;
        Ok(toggled.enabled)
    }
}
