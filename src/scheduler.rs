//! Repeating poll streams with pause/resume and host-visibility gating.
//!
//! Each logical stream (task refresh, one per report job, health check) gets
//! its own timer task, keyed by name. Suppressed ticks still elapse; only the
//! callback is skipped. Stopping is cooperative: a callback that is already
//! running completes, but no further tick starts.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Default)]
struct StreamControl {
    paused: AtomicBool,
    stopped: AtomicBool,
    kick: Notify,
    halt: Notify,
}

impl StreamControl {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.halt.notify_one();
        }
    }
}

/// Live handle to one poll stream.
#[derive(Debug, Clone)]
pub struct PollHandle {
    key: String,
    control: Arc<StreamControl>,
}

impl PollHandle {
    pub fn is_stopped(&self) -> bool {
        self.control.is_stopped()
    }
}

struct SchedulerInner {
    streams: Mutex<HashMap<String, PollHandle>>,
    visibility: watch::Sender<Visibility>,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<SchedulerInner>,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PollScheduler {
    pub fn new() -> Self {
        let (visibility, _) = watch::channel(Visibility::Visible);
        Self {
            inner: Arc::new(SchedulerInner {
                streams: Mutex::new(HashMap::new()),
                visibility,
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<String, PollHandle>> {
        self.inner
            .streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a stream under `key` whose first tick lands one `interval` from
    /// now. If a live stream already exists for `key`, it is returned as-is.
    /// After `shutdown` the returned handle is already stopped and nothing
    /// is spawned.
    pub fn start<F, Fut>(&self, key: &str, interval: Duration, tick: F) -> PollHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut streams = self.streams();
        if self.is_closed() {
            log::debug!("scheduler closed; not starting poll stream '{key}'");
            let control = StreamControl::default();
            control.stopped.store(true, Ordering::SeqCst);
            return PollHandle {
                key: key.to_owned(),
                control: Arc::new(control),
            };
        }
        if let Some(existing) = streams.get(key) {
            if !existing.is_stopped() {
                log::debug!("poll stream '{key}' already running");
                return existing.clone();
            }
        }

        let handle = PollHandle {
            key: key.to_owned(),
            control: Arc::new(StreamControl::default()),
        };
        streams.insert(key.to_owned(), handle.clone());
        drop(streams);

        let first_tick = Instant::now() + interval;
        let control = Arc::clone(&handle.control);
        let visibility = self.inner.visibility.subscribe();
        let stream_key = key.to_owned();
        tokio::spawn(async move {
            run_stream(control, first_tick, interval, visibility, tick).await;
            log::debug!("poll stream '{stream_key}' exited");
        });

        log::debug!("poll stream '{key}' started every {interval:?}");
        handle
    }

    pub fn stop(&self, handle: &PollHandle) {
        handle.control.stop();
        let mut streams = self.streams();
        let is_current = streams
            .get(&handle.key)
            .is_some_and(|live| Arc::ptr_eq(&live.control, &handle.control));
        if is_current {
            streams.remove(&handle.key);
        }
    }

    pub fn stop_key(&self, key: &str) -> bool {
        let removed = self.streams().remove(key);
        match removed {
            Some(handle) => {
                handle.control.stop();
                true
            }
            None => false,
        }
    }

    pub fn pause(&self, handle: &PollHandle) {
        handle.control.paused.store(true, Ordering::SeqCst);
    }

    /// Clears the pause flag and fires one immediate tick if the host is
    /// visible, then the normal cadence continues from now.
    pub fn resume(&self, handle: &PollHandle) {
        if handle.is_stopped() {
            return;
        }
        if handle.control.paused.swap(false, Ordering::SeqCst) {
            handle.control.kick.notify_one();
        }
    }

    /// Requests one out-of-band tick; skipped like any other tick while the
    /// stream is paused or the host is hidden.
    pub fn trigger(&self, handle: &PollHandle) {
        if !handle.is_stopped() {
            handle.control.kick.notify_one();
        }
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.inner.visibility.send_replace(visibility);
    }

    pub fn handle(&self, key: &str) -> Option<PollHandle> {
        self.streams().get(key).cloned()
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.streams()
            .get(key)
            .is_some_and(|handle| !handle.is_stopped())
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.streams().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stops every live stream and refuses new ones; used on teardown.
    pub fn shutdown(&self) {
        let drained: Vec<PollHandle> = {
            let mut streams = self.streams();
            self.inner.closed.store(true, Ordering::SeqCst);
            streams.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &drained {
            handle.control.stop();
        }
        if !drained.is_empty() {
            log::debug!("stopped {} poll stream(s)", drained.len());
        }
    }
}

enum Wake {
    Halt,
    Kick,
    Visibility(bool),
    Tick,
}

async fn run_stream<F, Fut>(
    control: Arc<StreamControl>,
    first_tick: Instant,
    interval: Duration,
    mut visibility: watch::Receiver<Visibility>,
    tick: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut was_visible = *visibility.borrow_and_update() == Visibility::Visible;

    loop {
        let wake = tokio::select! {
            biased;
            _ = control.halt.notified() => Wake::Halt,
            _ = control.kick.notified() => Wake::Kick,
            changed = visibility.changed() => Wake::Visibility(changed.is_ok()),
            _ = ticker.tick() => Wake::Tick,
        };

        if control.is_stopped() {
            break;
        }

        let visible = *visibility.borrow_and_update() == Visibility::Visible;
        let runnable = visible && !control.is_paused();
        let fire = match wake {
            Wake::Halt => break,
            Wake::Visibility(false) => break,
            Wake::Kick => runnable,
            Wake::Visibility(true) => {
                let became_visible = visible && !was_visible;
                was_visible = visible;
                became_visible && runnable
            }
            Wake::Tick => runnable,
        };

        if fire {
            if !matches!(wake, Wake::Tick) {
                ticker.reset();
            }
            tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_stream(scheduler: &PollScheduler, key: &str, every: Duration) -> (PollHandle, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = scheduler.start(key, every, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (handle, count)
    }

    async fn settle() {
        time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_the_interval() {
        let scheduler = PollScheduler::new();
        let (_handle, count) = counting_stream(&scheduler, "refresh", Duration::from_secs(5));

        time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(10_200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn starting_a_live_key_again_is_a_no_op() {
        let scheduler = PollScheduler::new();
        let (first, count) = counting_stream(&scheduler, "refresh", Duration::from_secs(5));
        let (second, second_count) = counting_stream(&scheduler, "refresh", Duration::from_secs(1));

        assert!(Arc::ptr_eq(&first.control, &second.control));
        assert_eq!(scheduler.live_count(), 1);

        time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_suppresses_and_resume_fires_once_then_keeps_cadence() {
        let scheduler = PollScheduler::new();
        let (handle, count) = counting_stream(&scheduler, "refresh", Duration::from_secs(5));

        scheduler.pause(&handle);
        time::sleep(Duration::from_millis(20_050)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        scheduler.resume(&handle);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_without_pause_does_not_fire() {
        let scheduler = PollScheduler::new();
        let (handle, count) = counting_stream(&scheduler, "refresh", Duration::from_secs(5));

        scheduler.resume(&handle);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_host_skips_ticks_and_showing_fires_immediately() {
        let scheduler = PollScheduler::new();
        let (_handle, count) = counting_stream(&scheduler, "refresh", Duration::from_secs(5));

        scheduler.set_visibility(Visibility::Hidden);
        time::sleep(Duration::from_millis(12_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        scheduler.set_visibility(Visibility::Visible);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn showing_a_paused_stream_stays_quiet() {
        let scheduler = PollScheduler::new();
        let (handle, count) = counting_stream(&scheduler, "refresh", Duration::from_secs(5));

        scheduler.pause(&handle);
        scheduler.set_visibility(Visibility::Hidden);
        settle().await;
        scheduler.set_visibility(Visibility::Visible);
        time::sleep(Duration::from_millis(11_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_the_running_tick_finish_but_starts_no_more() {
        let scheduler = PollScheduler::new();
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (s, f) = (Arc::clone(&started), Arc::clone(&finished));
        let handle = scheduler.start("job-1", Duration::from_secs(2), move || {
            let (s, f) = (Arc::clone(&s), Arc::clone(&f));
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                time::sleep(Duration::from_secs(3)).await;
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        scheduler.stop(&handle);
        assert!(!scheduler.is_active("job-1"));

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_a_stale_handle_leaves_the_new_stream_alone() {
        let scheduler = PollScheduler::new();
        let (old, _) = counting_stream(&scheduler, "health", Duration::from_secs(1));
        scheduler.stop(&old);
        let (_fresh, count) = counting_stream(&scheduler, "health", Duration::from_secs(1));

        scheduler.stop(&old);
        assert!(scheduler.is_active("health"));
        time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_every_stream() {
        let scheduler = PollScheduler::new();
        let (_a, a_count) = counting_stream(&scheduler, "refresh", Duration::from_secs(5));
        let (_b, b_count) = counting_stream(&scheduler, "job:abc", Duration::from_secs(2));
        assert_eq!(scheduler.live_count(), 2);

        scheduler.shutdown();
        assert_eq!(scheduler.live_count(), 0);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(a_count.load(Ordering::SeqCst), 0);
        assert_eq!(b_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_starts_after_shutdown() {
        let scheduler = PollScheduler::new();
        scheduler.shutdown();
        assert!(scheduler.is_closed());

        let (handle, count) = counting_stream(&scheduler, "refresh", Duration::from_secs(1));
        assert!(handle.is_stopped());
        assert!(!scheduler.is_active("refresh"));
        assert_eq!(scheduler.live_count(), 0);

        scheduler.trigger(&handle);
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
