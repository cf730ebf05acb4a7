//! Device jobs
//!
//! A [`Job`] wraps one unit of device I/O. The worker runs jobs one at a
//! time; completion is reported back to the controlling thread through
//! [`DeviceEvent::JobDone`].
//!
//! Lifecycle: `Waiting -> Running -> {Succeeded, Failed, Aborted}`. Every
//! path through a job ends in exactly one `job_done`, whether the function
//! returned, failed, panicked, or never ran because the job was aborted.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Once, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::driver::DeviceDriver;
use crate::error::{DeviceError, Result};
use crate::event::DeviceEvent;
use crate::model::{Annotation, BookId, Booklists, DeviceInformation, StorageStatus, UploadedBook};
use crate::tracker::JobTracker;

/// Unique identifier of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Waiting,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl JobState {
    pub fn is_finished(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Aborted)
    }
}

/// Value produced by a job function
#[derive(Debug)]
pub enum JobOutput {
    DeviceInfo(DeviceInformation),
    Books(Booklists),
    Annotations(HashMap<BookId, Vec<Annotation>>),
    Synced(StorageStatus),
    Uploaded(Vec<UploadedBook>),
    Deleted(Vec<String>),
    Saved(Vec<PathBuf>),
    Viewed(PathBuf),
}

/// The device operation a job performs
pub type JobFn = Box<dyn FnOnce(&mut dyn DeviceDriver) -> Result<JobOutput> + Send>;

/// Callback the consumer of `JobDone` invokes on the controlling thread
pub type DoneCallback = Box<dyn FnOnce(&Arc<Job>) + Send>;

/// A progress notification queued by `report_progress`
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f32,
    pub message: String,
}

struct JobInner {
    state: JobState,
    func: Option<JobFn>,
    started_at: Option<Instant>,
    started: Option<DateTime<Utc>>,
    duration: Option<Duration>,
    percent: f32,
    failed: bool,
    result: Option<JobOutput>,
    error: Option<Arc<DeviceError>>,
    details: Option<String>,
    done: Option<DoneCallback>,
    notifications: VecDeque<ProgressUpdate>,
}

impl JobInner {
    fn start(&mut self) {
        self.state = JobState::Running;
        self.started_at = Some(Instant::now());
        self.started = Some(Utc::now());
    }

    fn record_failure(&mut self, error: DeviceError, details: String) {
        self.failed = true;
        self.details = Some(details);
        self.error = Some(Arc::new(error));
    }
}

struct JobNotifier {
    tracker: Arc<dyn JobTracker>,
    /// Owned by the worker; completion is dropped once it has exited
    events: Weak<mpsc::Sender<DeviceEvent>>,
}

/// A unit of device work
pub struct Job {
    id: JobId,
    description: String,
    inner: Mutex<JobInner>,
    aborted: AtomicBool,
    done_fired: AtomicBool,
    notifier: Option<JobNotifier>,
}

impl Job {
    /// Create a job that reports to nobody
    ///
    /// Useful for running a job function directly against a driver.
    pub fn new(func: JobFn, description: impl Into<String>) -> Arc<Job> {
        Arc::new(Self::build(func, None, description.into(), None))
    }

    /// Create a job wired to a tracker and the manager's event channel
    pub(crate) fn tracked(
        func: JobFn,
        done: Option<DoneCallback>,
        description: String,
        tracker: Arc<dyn JobTracker>,
        events: Weak<mpsc::Sender<DeviceEvent>>,
    ) -> Arc<Job> {
        Arc::new(Self::build(func, done, description, Some(JobNotifier { tracker, events })))
    }

    fn build(func: JobFn, done: Option<DoneCallback>, description: String, notifier: Option<JobNotifier>) -> Self {
        Self {
            id: JobId::new(),
            description,
            inner: Mutex::new(JobInner {
                state: JobState::Waiting,
                func: Some(func),
                started_at: None,
                started: None,
                duration: None,
                percent: 0.0,
                failed: false,
                result: None,
                error: None,
                details: None,
                done,
                notifications: VecDeque::new(),
            }),
            aborted: AtomicBool::new(false),
            done_fired: AtomicBool::new(false),
            notifier,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn state(&self) -> JobState {
        self.inner.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    pub fn is_failed(&self) -> bool {
        self.inner.lock().failed
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Progress in percent, 100 once the job is done
    pub fn percent(&self) -> f32 {
        self.inner.lock().percent
    }

    /// Wall-clock time the job started running
    pub fn started(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().started
    }

    /// Time from start to done, `None` until the job finishes
    pub fn duration(&self) -> Option<Duration> {
        self.inner.lock().duration
    }

    /// The error that failed or aborted the job
    pub fn error(&self) -> Option<Arc<DeviceError>> {
        self.inner.lock().error.clone()
    }

    /// Human readable failure text, with a backtrace for errors raised while running
    pub fn details(&self) -> Option<String> {
        self.inner.lock().details.clone()
    }

    /// Take the function's output, leaving `None` behind
    pub fn take_result(&self) -> Option<JobOutput> {
        self.inner.lock().result.take()
    }

    pub fn take_done_callback(&self) -> Option<DoneCallback> {
        self.inner.lock().done.take()
    }

    /// Drain the progress notifications queued so far
    pub fn drain_notifications(&self) -> Vec<ProgressUpdate> {
        self.inner.lock().notifications.drain(..).collect()
    }

    /// Run the job function against `driver`
    ///
    /// Does nothing unless the job is still waiting.
    pub fn run(self: &Arc<Self>, driver: &mut dyn DeviceDriver) {
        let func = {
            let mut inner = self.inner.lock();
            if inner.state != JobState::Waiting {
                return;
            }
            let Some(func) = inner.func.take() else {
                return;
            };
            inner.start();
            func
        };
        self.notify_changed();

        let _done = DoneGuard(self);
        tracing::debug!("Running job {}: {}", self.id, self.description);

        install_panic_hook();
        CAPTURE_PANIC_TRACE.with(|capture| capture.set(true));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| func(driver)));
        CAPTURE_PANIC_TRACE.with(|capture| capture.set(false));
        let panic_trace = PANIC_TRACE.with(|trace| trace.borrow_mut().take());

        if self.is_aborted() {
            tracing::debug!("Discarding outcome of aborted job {}", self.id);
            return;
        }

        match outcome {
            Ok(Ok(output)) => self.inner.lock().result = Some(output),
            Ok(Err(error)) => self.fail(error, None),
            Err(payload) => self.fail(DeviceError::Panicked(panic_message(payload.as_ref())), panic_trace),
        }
    }

    /// Record a failure; `trace` is the backtrace taken where a panic started
    fn fail(&self, error: DeviceError, trace: Option<String>) {
        tracing::warn!("Job {} failed: {}", self.description, error);
        let trace = trace.unwrap_or_else(|| Backtrace::force_capture().to_string());
        let details = format!("{}\n\n{}", error, trace);
        self.inner.lock().record_failure(error, details);
    }

    /// Abort the job
    ///
    /// A waiting job is finished immediately without its function ever
    /// running. A running job is only flagged; its outcome is discarded when
    /// the function returns. Finished jobs are left alone.
    pub fn abort(self: &Arc<Self>, error: DeviceError) {
        let was_waiting = {
            let mut inner = self.inner.lock();
            if inner.state.is_finished() {
                return;
            }
            self.aborted.store(true, Ordering::SeqCst);
            let details = error.to_string();
            inner.record_failure(error, details);
            if inner.state == JobState::Waiting {
                inner.func = None;
                inner.start();
                true
            } else {
                false
            }
        };

        if was_waiting {
            self.notify_changed();
            self.job_done();
        }
    }

    /// Queue a progress notification
    pub fn report_progress(self: &Arc<Self>, percent: f32, message: impl Into<String>) {
        {
            let mut inner = self.inner.lock();
            let percent = percent.clamp(0.0, 100.0);
            inner.percent = percent;
            inner.notifications.push_back(ProgressUpdate {
                percent,
                message: message.into(),
            });
        }
        self.notify_changed();
    }

    fn job_done(self: &Arc<Self>) {
        if self.done_fired.swap(true, Ordering::SeqCst) {
            return;
        }

        let state = {
            let mut inner = self.inner.lock();
            let started_at = *inner.started_at.get_or_insert_with(Instant::now);
            inner.duration = Some(started_at.elapsed());
            inner.percent = 100.0;
            inner.state = if self.is_aborted() {
                JobState::Aborted
            } else if inner.failed {
                JobState::Failed
            } else {
                JobState::Succeeded
            };
            inner.state
        };
        tracing::debug!("Job {} done: {:?}", self.id, state);

        self.notify_changed();
        if let Some(notifier) = &self.notifier {
            let delivered = notifier
                .events
                .upgrade()
                .is_some_and(|events| events.send(DeviceEvent::JobDone(Arc::clone(self))).is_ok());
            if !delivered {
                tracing::debug!("Event channel closed, job {} completion not delivered", self.id);
            }
        }
    }

    fn notify_changed(self: &Arc<Self>) {
        if let Some(notifier) = &self.notifier {
            notifier.tracker.job_changed(self);
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("state", &self.state())
            .finish()
    }
}

struct DoneGuard<'a>(&'a Arc<Job>);

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.0.job_done();
    }
}

thread_local! {
    static CAPTURE_PANIC_TRACE: Cell<bool> = const { Cell::new(false) };
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook that records the panicking frame for jobs being run
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURE_PANIC_TRACE.with(Cell::get) {
                let trace = Backtrace::force_capture().to_string();
                PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            }
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle a driver uses to report progress of the running job
#[derive(Clone, Default)]
pub struct ProgressReporter(Option<Weak<Job>>);

impl ProgressReporter {
    /// A reporter that drops every report
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn for_job(job: &Arc<Job>) -> Self {
        Self(Some(Arc::downgrade(job)))
    }

    pub fn report(&self, percent: f32, message: impl Into<String>) {
        if let Some(job) = self.0.as_ref().and_then(Weak::upgrade) {
            job.report_progress(percent, message);
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProgressReporter").field(&self.0.is_some()).finish()
    }
}
