use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::{ClientGroup, ConnectionStatus, JobKind, JobProgress, JobStatus, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Recomputed views handed over after a refresh or a view change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskView {
    pub visible: Vec<Task>,
    pub groups: Vec<ClientGroup>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub job_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub message: Option<String>,
    pub progress: Option<JobProgress>,
}

impl JobEvent {
    /// One status line, e.g. `demo acme is running (3/7 installing)`.
    pub fn summary(&self) -> String {
        let mut line = match self.kind {
            JobKind::Demo => format!("demo {} is {}", self.job_id, self.status),
            kind => format!("{kind} report {} is {}", self.job_id, self.status),
        };
        if let Some(progress) = &self.progress {
            line.push_str(&format!(" ({progress})"));
        }
        if let Some(message) = &self.message {
            line.push_str(&format!(": {message}"));
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    Tasks(TaskView),
    Notification(Notification),
    /// Error display state for the task list; cleared by the next render.
    LoadError(String),
    Job(JobEvent),
    Connection(ConnectionStatus),
}

/// Where the sync core hands its output. Implementations must not block.
pub trait RenderSink: Send + Sync {
    fn publish(&self, event: DashboardEvent);
}

/// Plain line-oriented output for the terminal.
#[derive(Debug, Default)]
pub struct TerminalSink {
    grouped: AtomicBool,
}

impl TerminalSink {
    pub fn set_grouped(&self, grouped: bool) {
        self.grouped.store(grouped, Ordering::Relaxed);
    }

    pub fn grouped(&self) -> bool {
        self.grouped.load(Ordering::Relaxed)
    }
}

impl RenderSink for TerminalSink {
    fn publish(&self, event: DashboardEvent) {
        match event {
            DashboardEvent::Tasks(view) => {
                let stamp = Local::now().format("%H:%M:%S");
                if self.grouped() {
                    println!("── {stamp} · {} open group(s) ──", view.groups.len());
                    print_groups(&view.groups);
                } else {
                    println!(
                        "── {stamp} · {} of {} task(s) ──",
                        view.visible.len(),
                        view.total
                    );
                    print_tasks(&view.visible);
                }
            }
            DashboardEvent::Notification(notification) => match notification.level {
                NotificationLevel::Success => println!("✅ {}", notification.message),
                NotificationLevel::Info => println!("ℹ️  {}", notification.message),
                NotificationLevel::Error => println!("❌ {}", notification.message),
            },
            DashboardEvent::LoadError(message) => {
                println!("⚠️  Could not load tasks: {message}");
            }
            DashboardEvent::Job(job) => println!("🔄 {}", job.summary()),
            DashboardEvent::Connection(status) => {
                println!("🔌 connection: {status}");
            }
        }
    }
}

pub fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }
    println!("{:<24} {:<18} {:<20} {:<16} Name", "ID", "State", "Client", "Updated");
    println!("{}", "-".repeat(96));
    for task in tasks {
        println!(
            "{:<24} {:<18} {:<20} {:<16} {}",
            task.task_id,
            task.state.as_str(),
            task.client_name.as_deref().unwrap_or("-"),
            task.updated_at
                .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_owned()),
            task.task_name
        );
    }
}

pub fn print_groups(groups: &[ClientGroup]) {
    if groups.is_empty() {
        println!("No open tasks.");
        return;
    }
    for group in groups {
        println!("📁 {} ({})", group.client_name, group.tasks.len());
        for task in &group.tasks {
            println!("   {:<24} {:<18} {}", task.task_id, task.state.as_str(), task.task_name);
        }
    }
}
