//! Job tracking
//!
//! The manager registers every job it creates with a [`JobTracker`] and
//! reports each state change to it. The tracker also decides whether the
//! device is busy, which gates eject.

use std::sync::{mpsc, Arc};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::job::{Job, JobId, JobState};

/// Sink for job registration and state changes
pub trait JobTracker: Send + Sync {
    fn add_job(&self, job: &Arc<Job>);

    /// Called on start, progress and done. Must not block.
    fn job_changed(&self, job: &Arc<Job>);

    /// Whether any registered job is still waiting or running
    fn has_device_jobs(&self) -> bool;
}

/// A state change observed by the registry
#[derive(Debug, Clone)]
pub struct JobChange {
    pub id: JobId,
    pub state: JobState,
    pub percent: f32,
}

/// In-memory job tracker
///
/// Holds registered jobs until they finish and forwards state changes to a
/// single consumer through [`JobRegistry::changes`].
pub struct JobRegistry {
    jobs: RwLock<Vec<Arc<Job>>>,
    change_tx: mpsc::Sender<JobChange>,
    change_rx: Arc<Mutex<mpsc::Receiver<JobChange>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            jobs: RwLock::new(Vec::new()),
            change_tx: tx,
            change_rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Snapshot of waiting and running jobs, oldest first
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.jobs.read().clone()
    }

    /// Iterator over state changes
    ///
    /// All clones share one receiver, so each change is seen once.
    pub fn changes(&self) -> JobChanges {
        JobChanges {
            rx: Arc::clone(&self.change_rx),
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTracker for JobRegistry {
    fn add_job(&self, job: &Arc<Job>) {
        if job.is_finished() {
            return;
        }
        tracing::debug!("Tracking job {}: {}", job.id(), job.description());
        self.jobs.write().push(Arc::clone(job));
    }

    fn job_changed(&self, job: &Arc<Job>) {
        let change = JobChange {
            id: job.id(),
            state: job.state(),
            percent: job.percent(),
        };
        if change.state.is_finished() {
            self.jobs.write().retain(|tracked| tracked.id() != change.id);
        }
        // Nobody listening is fine.
        let _ = self.change_tx.send(change);
    }

    fn has_device_jobs(&self) -> bool {
        !self.jobs.read().is_empty()
    }
}

/// Blocking iterator over job state changes
pub struct JobChanges {
    rx: Arc<Mutex<mpsc::Receiver<JobChange>>>,
}

impl JobChanges {
    /// Try to receive a change without blocking
    pub fn try_recv(&self) -> Option<JobChange> {
        self.rx.lock().try_recv().ok()
    }

    /// Block until a change arrives or the timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<JobChange> {
        self.rx.lock().recv_timeout(timeout).ok()
    }

    /// Drain the changes currently queued
    pub fn drain(&self) -> Vec<JobChange> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Iterator for JobChanges {
    type Item = JobChange;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.lock().recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    use crate::error::DeviceError;
    use crate::job::JobOutput;
    use crate::test_support::NullDriver;

    fn registered(registry: &Arc<JobRegistry>) -> Arc<Job> {
        let job = Job::tracked(
            Box::new(|_| Ok(JobOutput::Deleted(vec![]))),
            None,
            "noop".into(),
            registry.clone(),
            Weak::new(),
        );
        registry.add_job(&job);
        job
    }

    #[test]
    fn test_has_device_jobs_until_done() {
        let registry = Arc::new(JobRegistry::new());
        assert!(!registry.has_device_jobs());

        let job = registered(&registry);
        assert!(registry.has_device_jobs());
        assert_eq!(registry.jobs().len(), 1);

        job.run(&mut NullDriver::default());
        assert!(!registry.has_device_jobs());
        assert!(registry.jobs().is_empty());
    }

    #[test]
    fn test_finished_jobs_are_forgotten() {
        let registry = Arc::new(JobRegistry::new());
        let jobs: Vec<_> = (0..5).map(|_| registered(&registry)).collect();
        assert_eq!(registry.jobs().len(), 5);

        jobs[0].abort(DeviceError::NotConnected);
        for job in &jobs[1..] {
            job.run(&mut NullDriver::default());
        }

        assert!(registry.jobs().is_empty());
        assert!(!registry.has_device_jobs());

        // A job finished before registration is never held.
        registry.add_job(&jobs[0]);
        assert!(registry.jobs().is_empty());
    }

    #[test]
    fn test_changes_follow_lifecycle() {
        let registry = Arc::new(JobRegistry::new());
        let changes = registry.changes();
        let job = registered(&registry);
        job.run(&mut NullDriver::default());

        let states: Vec<JobState> = changes.drain().into_iter().map(|c| c.state).collect();
        assert_eq!(states.first(), Some(&JobState::Running));
        assert_eq!(states.last(), Some(&JobState::Succeeded));
        assert!(changes.try_recv().is_none());
    }
}
