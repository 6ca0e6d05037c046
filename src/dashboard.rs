use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::api::DashboardApi;
use crate::config::Config;
use crate::error::DashError;
use crate::health::ConnectionMonitor;
use crate::jobs::JobTracker;
use crate::models::{JobKind, ReportRequest, SortKey, StatusFilter};
use crate::render::{DashboardEvent, Notification, RenderSink, TerminalSink};
use crate::scheduler::{PollScheduler, Visibility};
use crate::sync::{required_id, RefreshOptions, RefreshOutcome, TaskSyncEngine};

/// Everything that runs while the dashboard is open, sharing one scheduler.
pub struct Dashboard {
    pub scheduler: PollScheduler,
    pub engine: Arc<TaskSyncEngine>,
    pub jobs: Arc<JobTracker>,
    pub health: Arc<ConnectionMonitor>,
    sink: Arc<dyn RenderSink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Refresh,
    TogglePause,
    Filter(StatusFilter),
    Search(String),
    Sort(SortKey),
    ToggleGrouped,
    Hide,
    Show,
    Import(String),
    Delete(String),
    Describe(String, String),
    Run(JobKind, String),
    Jobs,
    Cancel(String),
    Help,
    Quit,
}

impl WatchCommand {
    pub fn parse(line: &str) -> Result<Self, DashError> {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map(|(verb, rest)| (verb, rest.trim()))
            .unwrap_or((line, ""));

        let command = match verb.to_lowercase().as_str() {
            "r" | "refresh" => WatchCommand::Refresh,
            "p" | "pause" => WatchCommand::TogglePause,
            "f" | "filter" => WatchCommand::Filter(rest.parse()?),
            "s" | "search" => WatchCommand::Search(rest.to_owned()),
            "o" | "sort" if rest.is_empty() => WatchCommand::Sort(SortKey::default()),
            "o" | "sort" => WatchCommand::Sort(SortKey::parse(rest)),
            "g" | "group" => WatchCommand::ToggleGrouped,
            "hide" => WatchCommand::Hide,
            "show" => WatchCommand::Show,
            "import" => WatchCommand::Import(required_id(rest)?.to_owned()),
            "delete" => WatchCommand::Delete(required_id(rest)?.to_owned()),
            "describe" => {
                let (task_id, text) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| DashError::Validation("usage: describe <id> <text>".to_owned()))?;
                WatchCommand::Describe(task_id.to_owned(), text.trim().to_owned())
            }
            "run" => {
                let (kind, url) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| {
                        DashError::Validation("usage: run <performance|security> <url>".to_owned())
                    })?;
                WatchCommand::Run(kind.parse()?, url.trim().to_owned())
            }
            "jobs" => WatchCommand::Jobs,
            "cancel" => WatchCommand::Cancel(required_id(rest)?.to_owned()),
            "?" | "h" | "help" => WatchCommand::Help,
            "q" | "quit" | "exit" => WatchCommand::Quit,
            other => {
                return Err(DashError::Validation(format!(
                    "unknown command '{other}', type ? for help"
                )))
            }
        };
        Ok(command)
    }
}

impl Dashboard {
    pub fn new(api: Arc<dyn DashboardApi>, sink: Arc<dyn RenderSink>, config: &Config) -> Self {
        let scheduler = PollScheduler::new();
        Self {
            engine: TaskSyncEngine::new(
                api.clone(),
                scheduler.clone(),
                sink.clone(),
                config.refresh_interval,
            ),
            jobs: JobTracker::new(
                api.clone(),
                scheduler.clone(),
                sink.clone(),
                config.job_poll_interval,
            ),
            health: ConnectionMonitor::new(api, scheduler.clone(), sink.clone(), config.health_interval),
            scheduler,
            sink,
        }
    }

    /// Initial load; the health monitor only starts after it has rendered.
    pub async fn load(&self) -> RefreshOutcome {
        let outcome = self.engine.refresh(RefreshOptions::explicit()).await;
        self.health.start();
        outcome
    }

    /// Returns `false` once the dashboard should close.
    pub async fn handle(&self, command: WatchCommand) -> bool {
        match command {
            WatchCommand::Refresh => {
                self.engine.refresh(RefreshOptions::manual()).await;
            }
            WatchCommand::TogglePause => {
                let paused = self.engine.toggle_auto_refresh();
                self.notify(Notification::info(if paused {
                    "Auto-refresh paused"
                } else {
                    "Auto-refresh resumed"
                }));
            }
            WatchCommand::Filter(filter) => self.engine.set_filter(filter),
            WatchCommand::Search(text) => self.engine.set_search(&text),
            WatchCommand::Sort(sort) => self.engine.set_sort(sort),
            WatchCommand::Hide => self.scheduler.set_visibility(Visibility::Hidden),
            WatchCommand::Show => self.scheduler.set_visibility(Visibility::Visible),
            WatchCommand::Import(task_id) => {
                let result = self.engine.import_task(&task_id).await;
                self.report_invalid(result);
            }
            WatchCommand::Delete(task_id) => {
                let result = self.engine.delete_task(&task_id).await;
                self.report_invalid(result);
            }
            WatchCommand::Describe(task_id, text) => {
                let result = self.engine.update_description(&task_id, &text).await;
                self.report_invalid(result);
            }
            WatchCommand::Run(kind, url) => {
                let result = self.jobs.start_job(kind, ReportRequest { url }).await;
                self.report_invalid(result);
            }
            WatchCommand::Jobs => {
                self.notify(Notification::info(format!(
                    "{} job(s) in progress",
                    self.jobs.live_jobs()
                )));
            }
            WatchCommand::Cancel(job_id) => {
                self.notify(if self.jobs.cancel(&job_id) {
                    Notification::info(format!("Stopped tracking {job_id}; it keeps running on the server"))
                } else {
                    Notification::error(format!("No tracked job {job_id}"))
                });
            }
            WatchCommand::ToggleGrouped | WatchCommand::Help => {}
            WatchCommand::Quit => return false,
        }
        true
    }

    /// Stops every poll stream so nothing fires after close. Closing the
    /// scheduler first makes any registration racing with this
    /// call either fail or land before the trackers drain their state.
    pub fn teardown(&self) {
        self.scheduler.shutdown();
        self.jobs.teardown();
        self.health.stop();
        log::debug!("dashboard torn down");
    }

    /// Server failures are already notified by the engine or tracker; only
    /// rejected input is left to report.
    fn report_invalid<T>(&self, result: Result<T, DashError>) {
        if let Err(error @ DashError::Validation(_)) = result {
            self.notify(Notification::error(error.to_string()));
        }
    }

    fn notify(&self, notification: Notification) {
        self.sink.publish(DashboardEvent::Notification(notification));
    }
}

const HELP: &str = "\
Commands:
  r                      refresh now
  p                      pause/resume auto-refresh
  f <state|all>          filter by state
  s <text>               search (empty clears)
  o <field>_<asc|desc>   sort by updated, created, name, client or state
  g                      toggle grouped-by-client view
  hide | show            simulate the dashboard going to the background
  import <id>            import a task from the tracker
  delete <id>            delete a task
  describe <id> <text>   replace a task's description
  run <kind> <url>       start a performance or security report
  jobs                   count tracked report and demo jobs
  cancel <job-id>        stop tracking one job
  q                      quit";

/// Interactive terminal loop. Reads one command per line from stdin until
/// `q`, end of input, or Ctrl-C.
pub async fn run_watch(dashboard: Dashboard, terminal: Arc<TerminalSink>) -> Result<()> {
    dashboard.load().await;
    println!("Type ? for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match WatchCommand::parse(&line) {
            Ok(command) => command,
            Err(error) => {
                println!("❌ {error}");
                continue;
            }
        };
        match &command {
            WatchCommand::Help => println!("{HELP}"),
            WatchCommand::ToggleGrouped => {
                let grouped = !terminal.grouped();
                terminal.set_grouped(grouped);
                match dashboard.engine.current_view() {
                    Some(view) => terminal.publish(DashboardEvent::Tasks(view)),
                    None => println!("Nothing loaded yet."),
                }
            }
            _ => {}
        }
        if !dashboard.handle(command).await {
            break;
        }
    }

    dashboard.teardown();
    println!("👋 Goodbye!");
    Ok(())
}
