use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use regex::Regex;
use tokio::sync::oneshot;

use crate::api::{DashboardApi, JobStatusReport};
use crate::error::{ApiError, DashError};
use crate::models::{DemoRequest, JobKind, JobProgress, JobStatus, ReportRequest};
use crate::render::{DashboardEvent, JobEvent, Notification, RenderSink};
use crate::scheduler::{PollHandle, PollScheduler};

const RESERVED_SLUGS: [&str; 4] = ["admin", "api", "login", "signup"];

struct JobRecord {
    kind: JobKind,
    status: JobStatus,
    progress: Option<JobProgress>,
    handle: PollHandle,
    waiters: Vec<oneshot::Sender<JobEvent>>,
}

/// Tracks report and demo jobs until the server reports a verdict. Every job
/// has its own poll stream; a record exists exactly as long as its stream is
/// live.
pub struct JobTracker {
    api: Arc<dyn DashboardApi>,
    scheduler: PollScheduler,
    sink: Arc<dyn RenderSink>,
    poll_interval: Duration,
    jobs: Mutex<HashMap<String, JobRecord>>,
    this: Weak<JobTracker>,
}

fn stream_key(job_id: &str) -> String {
    format!("job:{job_id}")
}

impl JobTracker {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        scheduler: PollScheduler,
        sink: Arc<dyn RenderSink>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            api,
            scheduler,
            sink,
            poll_interval,
            jobs: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, JobRecord>> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn start_job(&self, kind: JobKind, request: ReportRequest) -> Result<String, DashError> {
        if kind == JobKind::Demo {
            return Err(DashError::Validation(
                "demos are created from a demo request, not a report URL".to_owned(),
            ));
        }
        let request = validate_request(request)?;
        let job_id = match self.api.start_report(kind, &request).await {
            Ok(job_id) => job_id,
            Err(error) => {
                self.notify(Notification::error(format!(
                    "Failed to start {kind} report: {}",
                    error.display_message()
                )));
                return Err(DashError::TransientFetch(error));
            }
        };
        self.track(kind, &job_id, &request.url);
        Ok(job_id)
    }

    /// Creates a demo site and tracks its build by slug. Input is checked
    /// locally before any request goes out.
    pub async fn start_demo(&self, request: DemoRequest) -> Result<String, DashError> {
        let request = validate_demo(request)?;
        let slug = match self.api.create_demo(&request).await {
            Ok(slug) => slug,
            Err(error) => {
                self.notify(Notification::error(format!(
                    "Failed to create demo for {}: {}",
                    request.business_name,
                    error.display_message()
                )));
                return Err(DashError::TransientFetch(error));
            }
        };
        self.track(JobKind::Demo, &slug, &request.business_name);
        Ok(slug)
    }

    /// Registers a freshly started job. Once the scheduler is closed the
    /// job is left to the server and nothing is tracked or published.
    fn track(&self, kind: JobKind, job_id: &str, subject: &str) {
        {
            let mut jobs = self.jobs();
            if self.scheduler.is_closed() {
                log::debug!("not tracking {kind} job {job_id}; dashboard closed while it started");
                return;
            }
            if jobs.contains_key(job_id) {
                log::warn!("server returned job id {job_id} that is already tracked");
                return;
            }
            let handle = self.start_polling(job_id);
            jobs.insert(
                job_id.to_owned(),
                JobRecord {
                    kind,
                    status: JobStatus::Queued,
                    progress: None,
                    handle,
                    waiters: Vec::new(),
                },
            );
        }

        log::info!("{kind} job {job_id} queued for {subject}");
        self.sink.publish(DashboardEvent::Job(JobEvent {
            job_id: job_id.to_owned(),
            kind,
            status: JobStatus::Queued,
            message: None,
            progress: None,
        }));
        self.notify(Notification::info(format!("{} started ({job_id})", title(kind))));
    }

    fn start_polling(&self, job_id: &str) -> PollHandle {
        let tracker = self.this.clone();
        let id = job_id.to_owned();
        self.scheduler
            .start(&stream_key(job_id), self.poll_interval, move || {
                let tracker = tracker.clone();
                let id = id.clone();
                async move {
                    if let Some(tracker) = tracker.upgrade() {
                        tracker.poll_job(&id).await;
                    }
                }
            })
    }

    /// One status check. The record may have been dropped while the request
    /// was in flight; in that case the response is ignored.
    async fn poll_job(&self, job_id: &str) {
        let kind = self.jobs().get(job_id).map(|record| record.kind);
        let result = match kind {
            Some(JobKind::Demo) => self.api.demo_status(job_id).await,
            Some(_) => self.api.job_status(job_id).await,
            None => return,
        };

        let mut jobs = self.jobs();
        let Some(record) = jobs.get_mut(job_id) else {
            log::debug!("ignoring status for job {job_id}; no longer tracked");
            return;
        };

        match result {
            Ok(report) if report.status.is_terminal() => {
                if let Some(record) = jobs.remove(job_id) {
                    drop(jobs);
                    self.finish(job_id, record, report);
                }
            }
            Ok(report) => {
                let previous = std::mem::replace(&mut record.status, report.status);
                let moved = record.progress != report.progress;
                record.progress.clone_from(&report.progress);
                let kind = record.kind;
                drop(jobs);
                if previous != report.status || moved {
                    log::debug!("job {job_id}: {previous} -> {}", report.status);
                    self.sink.publish(DashboardEvent::Job(JobEvent {
                        job_id: job_id.to_owned(),
                        kind,
                        status: report.status,
                        message: None,
                        progress: report.progress,
                    }));
                }
            }
            Err(error) => {
                if let Some(record) = jobs.remove(job_id) {
                    drop(jobs);
                    self.abort(job_id, record, error);
                }
            }
        }
    }

    fn finish(&self, job_id: &str, record: JobRecord, report: JobStatusReport) {
        self.scheduler.stop(&record.handle);
        let event = JobEvent {
            job_id: job_id.to_owned(),
            kind: record.kind,
            status: report.status,
            message: report.error.clone(),
            progress: report.progress,
        };
        let notification = match report.status {
            JobStatus::Done => Notification::success(format!(
                "{} {job_id} finished",
                title(record.kind)
            )),
            _ => Notification::error(format!(
                "{} {job_id} failed: {}",
                title(record.kind),
                report.error.as_deref().unwrap_or("no details from server")
            )),
        };
        log::info!("job {job_id} ended as {}", report.status);
        self.publish_terminal(record.waiters, event, notification);
    }

    fn abort(&self, job_id: &str, record: JobRecord, error: ApiError) {
        self.scheduler.stop(&record.handle);
        log::warn!("stopped tracking job {job_id}: {error}");
        let event = JobEvent {
            job_id: job_id.to_owned(),
            kind: record.kind,
            status: JobStatus::Aborted,
            message: Some(error.message),
            progress: record.progress,
        };
        let notification = Notification::error(format!(
            "Lost track of {} {job_id}; check the server for its result",
            title(record.kind).to_lowercase()
        ));
        self.publish_terminal(record.waiters, event, notification);
    }

    fn publish_terminal(&self, waiters: Vec<oneshot::Sender<JobEvent>>, event: JobEvent, notification: Notification) {
        for waiter in waiters {
            let _ = waiter.send(event.clone());
        }
        self.sink.publish(DashboardEvent::Job(event));
        self.notify(notification);
    }

    /// Receiver for the job's terminal event, or `None` if it is not tracked.
    pub fn subscribe(&self, job_id: &str) -> Option<oneshot::Receiver<JobEvent>> {
        let mut jobs = self.jobs();
        let record = jobs.get_mut(job_id)?;
        let (sender, receiver) = oneshot::channel();
        record.waiters.push(sender);
        Some(receiver)
    }

    /// Stops tracking one job without touching any other.
    pub fn cancel(&self, job_id: &str) -> bool {
        let removed = self.jobs().remove(job_id);
        match removed {
            Some(record) => {
                self.scheduler.stop(&record.handle);
                log::info!("stopped tracking job {job_id}");
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs().get(job_id).map(|record| record.status)
    }

    pub fn live_jobs(&self) -> usize {
        self.jobs().len()
    }

    /// Stops every job stream; pending subscribers see their channel close.
    pub fn teardown(&self) {
        let drained: Vec<(String, JobRecord)> = self.jobs().drain().collect();
        for (job_id, record) in drained {
            self.scheduler.stop(&record.handle);
            log::debug!("teardown stopped job {job_id}");
        }
    }

    fn notify(&self, notification: Notification) {
        self.sink.publish(DashboardEvent::Notification(notification));
    }
}

/// Converts a terminal job event into the matching error, if it failed.
pub fn terminal_error(event: &JobEvent) -> Option<DashError> {
    match event.status {
        JobStatus::Failed => Some(DashError::JobFailure {
            job_id: event.job_id.clone(),
            message: event
                .message
                .clone()
                .unwrap_or_else(|| "no details from server".to_owned()),
        }),
        JobStatus::Aborted => Some(DashError::JobPoll {
            job_id: event.job_id.clone(),
            source: ApiError::transport(event.message.clone().unwrap_or_default()),
        }),
        _ => None,
    }
}

fn validate_request(request: ReportRequest) -> Result<ReportRequest, DashError> {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(DashError::Validation("report URL is required".to_owned()));
    }
    let parsed = reqwest::Url::parse(url)
        .map_err(|error| DashError::Validation(format!("'{url}' is not a valid URL: {error}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(DashError::Validation(format!(
            "'{url}' must be an http or https URL"
        )));
    }
    Ok(ReportRequest {
        url: url.to_owned(),
    })
}

/// Checks a demo request the way the server would, so obvious mistakes
/// never cost a round trip.
pub fn validate_demo(request: DemoRequest) -> Result<DemoRequest, DashError> {
    let business_name = request.business_name.trim();
    if business_name.is_empty() {
        return Err(DashError::Validation("businessName is required".to_owned()));
    }
    let primary_color = request.primary_color.trim();
    if !matches_pattern(r"^#[0-9a-fA-F]{6}$", primary_color) {
        return Err(DashError::Validation(format!(
            "primaryColor '{primary_color}' must be a hex color like #1a2b3c"
        )));
    }

    let template_id = non_blank(request.template_id);
    let github_repo_url = non_blank(request.github_repo_url);
    if template_id.is_none() && github_repo_url.is_none() {
        return Err(DashError::Validation(
            "templateId or githubRepoUrl is required".to_owned(),
        ));
    }
    if let Some(url) = &github_repo_url {
        let parsed = reqwest::Url::parse(url)
            .map_err(|error| DashError::Validation(format!("'{url}' is not a valid URL: {error}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DashError::Validation(format!(
                "githubRepoUrl '{url}' must be an http or https URL"
            )));
        }
    }

    let slug = non_blank(request.slug);
    if let Some(slug) = &slug {
        validate_slug(slug)?;
    }

    Ok(DemoRequest {
        business_name: business_name.to_owned(),
        primary_color: primary_color.to_owned(),
        template_id,
        github_repo_url,
        slug,
    })
}

/// Lowercase letters and digits in hyphen-separated runs, and not one of
/// the routes the server keeps for itself.
pub fn validate_slug(slug: &str) -> Result<(), DashError> {
    if !matches_pattern(r"^[a-z0-9]+(-[a-z0-9]+)*$", slug) {
        return Err(DashError::Validation(format!(
            "slug '{slug}' does not match the pattern lowercase-words-and-digits"
        )));
    }
    if RESERVED_SLUGS.contains(&slug) {
        return Err(DashError::Validation(format!("slug '{slug}' is reserved")));
    }
    Ok(())
}

fn matches_pattern(pattern: &str, text: &str) -> bool {
    Regex::new(pattern)
        .map(|regex| regex.is_match(text))
        .unwrap_or(false)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

fn title(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Performance => "Performance report",
        JobKind::Security => "Security report",
        JobKind::Demo => "Demo",
    }
}
