use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crate::api::DashboardApi;
use crate::error::{ApiError, DashError};
use crate::fingerprint::Snapshot;
use crate::models::{SortKey, StatusFilter, ViewState};
use crate::pipeline::{group_by_client, render_list};
use crate::render::{DashboardEvent, Notification, RenderSink, TaskView};
use crate::scheduler::PollScheduler;

pub const TASK_STREAM: &str = "tasks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshOptions {
    /// User asked for it; a success notification follows.
    pub manual: bool,
    /// Background tick; unchanged data is not re-rendered and failures stay quiet.
    pub silent: bool,
}

impl RefreshOptions {
    pub const fn manual() -> Self {
        Self {
            manual: true,
            silent: false,
        }
    }

    pub const fn background() -> Self {
        Self {
            manual: false,
            silent: true,
        }
    }

    pub const fn explicit() -> Self {
        Self {
            manual: false,
            silent: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated { tasks: usize },
    Unchanged,
    /// A newer response was applied while this one was in flight.
    Superseded,
    /// The dashboard closed while the request was in flight; nothing applied.
    Closed,
    Failed(DashError),
}

struct SyncState {
    snapshot: Option<Snapshot>,
    view: ViewState,
    auto_refresh_paused: bool,
    last_applied: u64,
    load_error: Option<String>,
}

impl SyncState {
    fn task_view(&self) -> Option<TaskView> {
        let snapshot = self.snapshot.as_ref()?;
        Some(TaskView {
            visible: render_list(snapshot.tasks(), &self.view),
            groups: group_by_client(snapshot.tasks()),
            total: snapshot.len(),
        })
    }
}

/// Owns the task snapshot and view state, and keeps the snapshot fresh.
pub struct TaskSyncEngine {
    api: Arc<dyn DashboardApi>,
    scheduler: PollScheduler,
    sink: Arc<dyn RenderSink>,
    refresh_interval: Duration,
    next_request: AtomicU64,
    state: Mutex<SyncState>,
    this: Weak<TaskSyncEngine>,
}

impl TaskSyncEngine {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        scheduler: PollScheduler,
        sink: Arc<dyn RenderSink>,
        refresh_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            api,
            scheduler,
            sink,
            refresh_interval,
            next_request: AtomicU64::new(0),
            state: Mutex::new(SyncState {
                snapshot: None,
                view: ViewState::default(),
                auto_refresh_paused: false,
                last_applied: 0,
                load_error: None,
            }),
            this: this.clone(),
        })
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn refresh(&self, options: RefreshOptions) -> RefreshOutcome {
        let request = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.api.list_tasks().await;
        if self.scheduler.is_closed() {
            log::debug!("discarding task response #{request}; dashboard closed");
            return RefreshOutcome::Closed;
        }
        let outcome = match result {
            Ok(tasks) => self.apply(request, Snapshot::new(tasks), options),
            Err(error) => self.record_failure(request, error, options),
        };
        self.ensure_auto_refresh();
        outcome
    }

    /// Diff and replace happen under one lock so overlapping refreshes never
    /// interleave a partial update.
    fn apply(&self, request: u64, incoming: Snapshot, options: RefreshOptions) -> RefreshOutcome {
        let mut state = self.state();
        if request < state.last_applied {
            log::debug!(
                "discarding task response #{request}; #{} already applied",
                state.last_applied
            );
            return RefreshOutcome::Superseded;
        }
        state.last_applied = request;

        let unchanged = state
            .snapshot
            .as_ref()
            .is_some_and(|held| held.same_as(&incoming));
        if unchanged && options.silent {
            return RefreshOutcome::Unchanged;
        }

        let count = incoming.len();
        state.snapshot = Some(incoming);
        state.load_error = None;
        let view = state.task_view();
        drop(state);

        if let Some(view) = view {
            self.sink.publish(DashboardEvent::Tasks(view));
        }
        if options.manual {
            self.sink.publish(DashboardEvent::Notification(Notification::success(format!(
                "Refreshed {count} task(s)"
            ))));
        }
        log::debug!("task snapshot replaced with {count} task(s)");
        RefreshOutcome::Updated { tasks: count }
    }

    fn record_failure(&self, request: u64, error: ApiError, options: RefreshOptions) -> RefreshOutcome {
        let mut state = self.state();
        if request < state.last_applied {
            return RefreshOutcome::Superseded;
        }
        if options.silent {
            log::debug!("background task refresh failed: {error}");
            return RefreshOutcome::Failed(DashError::TransientFetch(error));
        }

        let message = error.display_message();
        state.load_error = Some(message.clone());
        drop(state);

        log::warn!("task refresh failed: {message}");
        self.sink.publish(DashboardEvent::Notification(Notification::error(format!(
            "Failed to refresh tasks: {message}"
        ))));
        self.sink.publish(DashboardEvent::LoadError(message));
        RefreshOutcome::Failed(DashError::TransientFetch(error))
    }

    fn ensure_auto_refresh(&self) {
        if self.state().auto_refresh_paused || self.scheduler.is_active(TASK_STREAM) {
            return;
        }
        self.start_stream();
    }

    fn start_stream(&self) -> crate::scheduler::PollHandle {
        let engine = self.this.clone();
        self.scheduler
            .start(TASK_STREAM, self.refresh_interval, move || {
                let engine = engine.clone();
                async move {
                    if let Some(engine) = engine.upgrade() {
                        engine.refresh(RefreshOptions::background()).await;
                    }
                }
            })
    }

    /// Suspends or restarts background refresh. The snapshot is kept either
    /// way; resuming fetches once immediately.
    pub fn set_auto_refresh_paused(&self, paused: bool) {
        self.state().auto_refresh_paused = paused;
        match (paused, self.scheduler.handle(TASK_STREAM)) {
            (true, Some(handle)) => self.scheduler.pause(&handle),
            (true, None) => {}
            (false, Some(handle)) => self.scheduler.resume(&handle),
            (false, None) => {
                let handle = self.start_stream();
                self.scheduler.trigger(&handle);
            }
        }
        log::info!(
            "auto-refresh {}",
            if paused { "paused" } else { "resumed" }
        );
    }

    pub fn toggle_auto_refresh(&self) -> bool {
        let paused = !self.is_auto_refresh_paused();
        self.set_auto_refresh_paused(paused);
        paused
    }

    pub fn is_auto_refresh_paused(&self) -> bool {
        self.state().auto_refresh_paused
    }

    pub fn set_filter(&self, filter: StatusFilter) {
        self.update_view(|view| view.filter = filter);
    }

    pub fn set_search(&self, search: &str) {
        self.update_view(|view| view.set_search(search));
    }

    pub fn set_sort(&self, sort: SortKey) {
        self.update_view(|view| view.sort = sort);
    }

    /// View changes re-run the pipeline over the held snapshot without a fetch.
    fn update_view(&self, change: impl FnOnce(&mut ViewState)) {
        let view = {
            let mut state = self.state();
            change(&mut state.view);
            state.task_view()
        };
        if let Some(view) = view {
            self.sink.publish(DashboardEvent::Tasks(view));
        }
    }

    pub fn view_state(&self) -> ViewState {
        self.state().view.clone()
    }

    pub fn current_view(&self) -> Option<TaskView> {
        self.state().task_view()
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.state().snapshot.clone()
    }

    pub fn load_error(&self) -> Option<String> {
        self.state().load_error.clone()
    }

    pub async fn import_task(&self, task_id: &str) -> Result<(), DashError> {
        let task_id = required_id(task_id)?;
        let imported = self.mutate(self.api.import_task(task_id).await, "import task")?;
        self.notify(Notification::success(format!(
            "Imported {} ({})",
            imported.task_name, imported.task_id
        )));
        self.refresh(RefreshOptions::explicit()).await;
        Ok(())
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), DashError> {
        let task_id = required_id(task_id)?;
        self.mutate(self.api.delete_task(task_id).await, "delete task")?;
        self.notify(Notification::success(format!("Deleted task {task_id}")));
        self.refresh(RefreshOptions::explicit()).await;
        Ok(())
    }

    pub async fn update_description(&self, task_id: &str, description: &str) -> Result<(), DashError> {
        let task_id = required_id(task_id)?;
        self.mutate(
            self.api.update_description(task_id, description.trim()).await,
            "update description",
        )?;
        self.notify(Notification::success(format!("Updated description of {task_id}")));
        self.refresh(RefreshOptions::explicit()).await;
        Ok(())
    }

    fn mutate<T>(&self, result: Result<T, ApiError>, action: &str) -> Result<T, DashError> {
        result.map_err(|error| {
            self.notify(Notification::error(format!(
                "Failed to {action}: {}",
                error.display_message()
            )));
            DashError::TransientFetch(error)
        })
    }

    fn notify(&self, notification: Notification) {
        self.sink.publish(DashboardEvent::Notification(notification));
    }
}

pub fn required_id(raw: &str) -> Result<&str, DashError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(DashError::Validation("task id cannot be empty".to_owned()));
    }
    Ok(id)
}
