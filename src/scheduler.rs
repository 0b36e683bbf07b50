//! Where signal-producing and signal-consuming work executes
//!
//! Schedulers are passed explicitly to the operators that need them
//! (`subscribe_on`, `observe_on`, `interval`, `timer`, `delay`, `timeout`,
//! `retry_with_policy`). There is no process-wide default; the
//! [`ImmediateScheduler`] is the deterministic choice for tests.

use std::sync::{mpsc, Arc, OnceLock};
use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

use crate::config::RxConfig;
use crate::error::{StreamError, StreamResult};
use crate::subscription::Subscription;

/// A unit of scheduled work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Work run on every period of `schedule_periodic`
pub type PeriodicTask = Arc<dyn Fn() + Send + Sync + 'static>;

/// Shared handle to a scheduler
pub type SchedulerRef = Arc<dyn Scheduler>;

/// Execution context abstraction.
///
/// Every method returns a [`Subscription`]; cancelling it prevents the work
/// from starting (work already running is not interrupted). The subscription
/// disposes itself once one-shot work has run.
pub trait Scheduler: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Run `task` as soon as possible
    fn schedule(&self, task: Task) -> Subscription;

    /// Run `task` once after `delay`
    fn schedule_after(&self, delay: Duration, task: Task) -> Subscription;

    /// Run `task` every `period`, first run one period from now
    fn schedule_periodic(&self, period: Duration, task: PeriodicTask) -> Subscription;
}

/// Runs work on the calling thread.
///
/// Timed work never blocks the caller: it is handed to the ambient tokio
/// runtime when one is entered, otherwise to one shared `rs2-rx-timer` thread
/// started on first use. Timed tasks on that thread run one after another, so
/// they should hand long work to another scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn name(&self) -> &str {
        "immediate"
    }

    fn schedule(&self, task: Task) -> Subscription {
        let subscription = Subscription::new();
        task();
        subscription.cancel();
        subscription
    }

    fn schedule_after(&self, delay: Duration, task: Task) -> Subscription {
        match timer_handle() {
            Some(handle) => spawn_after(&handle, delay, task),
            None => cancelled(),
        }
    }

    fn schedule_periodic(&self, period: Duration, task: PeriodicTask) -> Subscription {
        match timer_handle() {
            Some(handle) => spawn_periodic(&handle, period, task),
            None => cancelled(),
        }
    }
}

/// The ambient runtime, or the lazily started shared timer runtime
fn timer_handle() -> Option<Handle> {
    static TIMER: OnceLock<Option<TokioScheduler>> = OnceLock::new();

    if let Ok(handle) = Handle::try_current() {
        return Some(handle);
    }
    TIMER
        .get_or_init(|| match TokioScheduler::single_thread("timer") {
            Ok(scheduler) => Some(scheduler),
            Err(e) => {
                log::error!("failed to start timer thread: {}", e);
                None
            }
        })
        .as_ref()
        .map(|scheduler| scheduler.handle().clone())
}

fn cancelled() -> Subscription {
    let subscription = Subscription::new();
    subscription.cancel();
    subscription
}

/// Keeps an owned runtime alive on its own thread until dropped
struct OwnedRuntime {
    shutdown: Option<oneshot::Sender<()>>,
    name: String,
}

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        log::debug!("scheduler '{}' shutting down", self.name);
    }
}

/// A scheduler backed by a tokio runtime: either an owned worker pool, an owned
/// single background thread, or an existing runtime handle.
#[derive(Clone)]
pub struct TokioScheduler {
    name: String,
    handle: Handle,
    _owned: Option<Arc<OwnedRuntime>>,
}

impl TokioScheduler {
    /// Owned multi-thread runtime with `threads` workers
    pub fn worker_pool(threads: usize) -> StreamResult<Self> {
        if threads == 0 {
            return Err(StreamError::IllegalState(
                "worker pool needs at least one thread".to_string(),
            ));
        }
        let name = format!("worker-pool-{}", threads);
        Self::start(name, move || {
            Builder::new_multi_thread()
                .worker_threads(threads)
                .thread_name("rs2-rx-worker")
                .enable_all()
                .build()
        })
    }

    /// Worker pool sized from the configuration
    pub fn from_config(config: &RxConfig) -> StreamResult<Self> {
        Self::worker_pool(config.worker_threads)
    }

    /// Owned current-thread runtime driven by one dedicated thread.
    ///
    /// All work scheduled here runs sequentially on that thread.
    pub fn single_thread(name: &str) -> StreamResult<Self> {
        Self::start(name.to_string(), || {
            Builder::new_current_thread().enable_all().build()
        })
    }

    /// Schedule onto an existing runtime
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            name: "handle".to_string(),
            handle,
            _owned: None,
        }
    }

    /// Schedule onto the runtime the caller is running in, if any
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::from_handle)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    fn start<B>(name: String, build: B) -> StreamResult<Self>
    where
        B: FnOnce() -> std::io::Result<tokio::runtime::Runtime> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        thread::Builder::new()
            .name(format!("rs2-rx-{}", name))
            .spawn(move || match build() {
                Ok(runtime) => {
                    let _ = ready_tx.send(Ok(runtime.handle().clone()));
                    runtime.block_on(async {
                        let _ = shutdown_rx.await;
                    });
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })?;

        let handle = ready_rx
            .recv()
            .map_err(|_| StreamError::IllegalState("runtime thread exited".to_string()))??;
        log::debug!("scheduler '{}' started", name);

        Ok(Self {
            _owned: Some(Arc::new(OwnedRuntime {
                shutdown: Some(shutdown_tx),
                name: name.clone(),
            })),
            name,
            handle,
        })
    }
}

impl Scheduler for TokioScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, task: Task) -> Subscription {
        let subscription = Subscription::new();
        let guard = subscription.clone();
        let join = self.handle.spawn(async move {
            if !guard.is_cancelled() {
                task();
            }
            guard.cancel();
        });
        subscription.on_cancel(move || join.abort());
        subscription
    }

    fn schedule_after(&self, delay: Duration, task: Task) -> Subscription {
        spawn_after(&self.handle, delay, task)
    }

    fn schedule_periodic(&self, period: Duration, task: PeriodicTask) -> Subscription {
        spawn_periodic(&self.handle, period, task)
    }
}

fn spawn_after(handle: &Handle, delay: Duration, task: Task) -> Subscription {
    let subscription = Subscription::new();
    let guard = subscription.clone();
    let join = handle.spawn(async move {
        tokio::time::sleep(delay).await;
        if !guard.is_cancelled() {
            task();
        }
        guard.cancel();
    });
    subscription.on_cancel(move || join.abort());
    subscription
}

fn spawn_periodic(handle: &Handle, period: Duration, task: PeriodicTask) -> Subscription {
    let subscription = Subscription::new();
    let guard = subscription.clone();
    let join = handle.spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if guard.is_cancelled() {
                break;
            }
            task();
        }
    });
    subscription.on_cancel(move || join.abort());
    subscription
}

/// The caller-thread scheduler
pub fn immediate() -> SchedulerRef {
    Arc::new(ImmediateScheduler)
}

/// An owned worker pool with `threads` workers
pub fn worker_pool(threads: usize) -> StreamResult<SchedulerRef> {
    Ok(Arc::new(TokioScheduler::worker_pool(threads)?))
}

/// An owned single background thread
pub fn single_thread(name: &str) -> StreamResult<SchedulerRef> {
    Ok(Arc::new(TokioScheduler::single_thread(name)?))
}
