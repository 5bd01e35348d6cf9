//! Adaptive background job poller
//!
//! The poller owns a two-state scheduler driven only by the last observed
//! pending job count:
//!
//! - `Idle`: no interval exists. Nothing hits the server until
//!   [`ProgressPoller::check_now`] runs or a [`PollTrigger`] fires.
//! - `Active`: an interval task polls every `poll_interval` and returns to
//!   `Idle` as soon as a poll reports zero jobs.
//!
//! Every count change goes through [`ProgressPoller::set_pending_jobs`], which
//! reconciles the scheduler, so the published `is_polling` flag always
//! matches what is actually scheduled.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::domains::progress::state::ProgressState;
use crate::infrastructure::api_client::ApiClient;
use crate::infrastructure::errors::ApiResult;

/// Where the poller reads the pending job count from
#[async_trait]
pub trait ProgressSource: Send + Sync + fmt::Debug {
    async fn pending_jobs(&self) -> ApiResult<u64>;
}

#[async_trait]
impl ProgressSource for ApiClient {
    async fn pending_jobs(&self) -> ApiResult<u64> {
        ApiClient::pending_jobs(self).await
    }
}

/// Re-fetch routine registered by the page currently on screen
pub type RefreshCallback = Arc<dyn Fn() + Send + Sync>;

/// Cloneable handle for requesting an immediate progress check.
///
/// Requests made while a check is running are coalesced into one follow-up
/// check.
#[derive(Clone, Debug)]
pub struct PollTrigger {
    notify: Arc<Notify>,
}

impl PollTrigger {
    pub fn request_check(&self) {
        self.notify.notify_one();
    }
}

enum Schedule {
    Idle,
    Active(JoinHandle<()>),
}

struct PollerInner {
    source: Arc<dyn ProgressSource>,
    poll_interval: Duration,
    state: watch::Sender<ProgressState>,
    schedule: Mutex<Schedule>,
    listener: Mutex<Option<JoinHandle<()>>>,
    trigger: Arc<Notify>,
    refresh_callback: Mutex<Option<RefreshCallback>>,
    running: AtomicBool,
    runtime: Mutex<Option<Handle>>,
}

impl Drop for PollerInner {
    fn drop(&mut self) {
        if let Schedule::Active(task) = std::mem::replace(self.schedule.get_mut(), Schedule::Idle)
        {
            task.abort();
        }
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

/// Live count of pending server-side jobs.
///
/// Cheap to clone. Background tasks only hold weak references, so dropping
/// the last handle cancels all polling.
#[derive(Clone)]
pub struct ProgressPoller {
    inner: Arc<PollerInner>,
}

impl fmt::Debug for ProgressPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressPoller")
            .field("state", &*self.inner.state.borrow())
            .field("poll_interval", &self.inner.poll_interval)
            .field("running", &self.inner.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl ProgressPoller {
    /// Create a stopped poller. Nothing is scheduled until [`start`](Self::start).
    pub fn new(source: Arc<dyn ProgressSource>, poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(ProgressState::default());
        Self {
            inner: Arc::new(PollerInner {
                source,
                poll_interval,
                state,
                schedule: Mutex::new(Schedule::Idle),
                listener: Mutex::new(None),
                trigger: Arc::new(Notify::new()),
                refresh_callback: Mutex::new(None),
                running: AtomicBool::new(false),
                runtime: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ProgressState {
        *self.inner.state.borrow()
    }

    pub fn pending_jobs(&self) -> u64 {
        self.inner.state.borrow().pending_jobs
    }

    pub fn had_pending_jobs(&self) -> bool {
        self.inner.state.borrow().had_pending_jobs
    }

    pub fn is_polling(&self) -> bool {
        self.inner.state.borrow().is_polling
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.inner.state.subscribe()
    }

    pub fn trigger(&self) -> PollTrigger {
        PollTrigger {
            notify: Arc::clone(&self.inner.trigger),
        }
    }

    /// Start listening for triggers and run an initial check.
    ///
    /// Must be called from within a tokio runtime; calling it twice is a no-op.
    /// Polling is scheduled on that runtime from then on, whichever thread
    /// updates the count.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!("[ProgressPoller] No tokio runtime, poller not started");
            self.inner.running.store(false, Ordering::SeqCst);
            return;
        };

        info!(
            "[ProgressPoller] Started with interval of {:?}",
            self.inner.poll_interval
        );
        *self.inner.runtime.lock() = Some(handle.clone());
        self.inner.trigger.notify_one();
        let listener = handle.spawn(Self::listen(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.trigger),
        ));
        if let Some(previous) = self.inner.listener.lock().replace(listener) {
            previous.abort();
        }
        self.reconcile();
    }

    /// Cancel the interval and the trigger listener.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(listener) = self.inner.listener.lock().take() {
            listener.abort();
        }
        self.reconcile();
        info!("[ProgressPoller] Stopped");
    }

    /// Fetch the count once. Failures are logged and keep the last value.
    pub async fn check_now(&self) {
        match self.inner.source.pending_jobs().await {
            Ok(count) => {
                debug!("[ProgressPoller] {} pending job(s)", count);
                self.set_pending_jobs(count);
            }
            Err(e) => {
                warn!("[ProgressPoller] Progress check failed: {}", e);
            }
        }
    }

    /// Publish a new count and reschedule accordingly
    pub fn set_pending_jobs(&self, count: u64) {
        self.inner
            .state
            .send_if_modified(|state| state.apply_count(count));
        self.reconcile();
    }

    pub fn reset_had_pending_jobs(&self) {
        self.inner.state.send_if_modified(|state| {
            let changed = state.had_pending_jobs;
            state.had_pending_jobs = false;
            changed
        });
    }

    /// A caller just queued a job: count it immediately and confirm with
    /// the server.
    pub fn job_queued(&self) {
        self.set_pending_jobs(self.pending_jobs().saturating_add(1));
        self.inner.trigger.notify_one();
    }

    /// Register the routine that re-fetches the page on screen, replacing any
    /// previous one.
    pub fn register_refresh_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.refresh_callback.lock() = Some(Arc::new(callback));
    }

    pub fn clear_refresh_callback(&self) {
        self.inner.refresh_callback.lock().take();
    }

    /// Run the registered re-fetch and clear `had_pending_jobs`.
    pub fn refresh_view(&self) {
        let callback = self.inner.refresh_callback.lock().clone();
        match callback {
            Some(callback) => callback(),
            None => debug!("[ProgressPoller] No refresh callback registered"),
        }
        self.reset_had_pending_jobs();
    }

    fn reconcile(&self) {
        let wants_active =
            self.inner.running.load(Ordering::SeqCst) && self.inner.state.borrow().pending_jobs > 0;

        let mut schedule = self.inner.schedule.lock();
        let active = matches!(&*schedule, Schedule::Active(task) if !task.is_finished());
        match (active, wants_active) {
            (true, true) => {}
            (false, false) => *schedule = Schedule::Idle,
            (false, true) => match self.runtime() {
                Some(handle) => {
                    debug!("[ProgressPoller] Jobs pending, polling");
                    *schedule = Schedule::Active(handle.spawn(Self::poll_loop(
                        Arc::downgrade(&self.inner),
                        self.inner.poll_interval,
                    )));
                }
                None => {
                    warn!("[ProgressPoller] No tokio runtime, cannot schedule polling");
                    *schedule = Schedule::Idle;
                }
            },
            (true, false) => {
                debug!("[ProgressPoller] No pending jobs, going idle");
                if let Schedule::Active(task) = std::mem::replace(&mut *schedule, Schedule::Idle) {
                    task.abort();
                }
            }
        }

        let is_polling = matches!(*schedule, Schedule::Active(_));
        drop(schedule);
        self.inner.state.send_if_modified(|state| {
            let changed = state.is_polling != is_polling;
            state.is_polling = is_polling;
            changed
        });
    }

    fn runtime(&self) -> Option<Handle> {
        self.inner
            .runtime
            .lock()
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    async fn poll_loop(inner: Weak<PollerInner>, period: Duration) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let poller = ProgressPoller { inner };
            poller.check_now().await;
            if poller.pending_jobs() == 0 {
                break;
            }
        }
    }

    async fn listen(inner: Weak<PollerInner>, trigger: Arc<Notify>) {
        loop {
            trigger.notified().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            ProgressPoller { inner }.check_now().await;
        }
    }
}
