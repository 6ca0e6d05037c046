use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::api::DashboardApi;
use crate::models::ConnectionStatus;
use crate::render::{DashboardEvent, RenderSink};
use crate::scheduler::PollScheduler;

pub const HEALTH_STREAM: &str = "health";

/// Periodic connectivity check. Each tick stands alone: no retries, no
/// backoff, last answer wins.
pub struct ConnectionMonitor {
    api: Arc<dyn DashboardApi>,
    scheduler: PollScheduler,
    sink: Arc<dyn RenderSink>,
    interval: Duration,
    last: Mutex<Option<ConnectionStatus>>,
    stopped: AtomicBool,
    this: Weak<ConnectionMonitor>,
}

impl ConnectionMonitor {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        scheduler: PollScheduler,
        sink: Arc<dyn RenderSink>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            api,
            scheduler,
            sink,
            interval,
            last: Mutex::new(None),
            stopped: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    /// Call once the initial load has rendered. Runs a first check right
    /// away, then one per interval.
    pub fn start(&self) {
        self.stopped.store(false, Ordering::SeqCst);
        let monitor = self.this.clone();
        let handle = self.scheduler.start(HEALTH_STREAM, self.interval, move || {
            let monitor = monitor.clone();
            async move {
                if let Some(monitor) = monitor.upgrade() {
                    monitor.check().await;
                }
            }
        });
        self.scheduler.trigger(&handle);
    }

    /// A check already in flight still completes but its answer is dropped.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.scheduler.stop_key(HEALTH_STREAM);
    }

    pub async fn check(&self) -> ConnectionStatus {
        let status = match self.api.health().await {
            Ok(report) => ConnectionStatus::from_wire(&report.integration_status),
            Err(error) => {
                log::debug!("health check failed: {error}");
                ConnectionStatus::Offline
            }
        };
        if self.stopped.load(Ordering::SeqCst) || self.scheduler.is_closed() {
            log::debug!("dropping health answer {status}; monitor stopped");
            return status;
        }

        let previous = self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(status);
        if previous != Some(status) {
            log::info!("connection status: {status}");
            self.sink.publish(DashboardEvent::Connection(status));
        }
        status
    }

    #[cfg(test)]
    pub fn status(&self) -> Option<ConnectionStatus> {
        *self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
