//! Background worker thread for device I/O
//!
//! The worker is the only thread that touches drivers. It owns the scanner,
//! the plugin drivers and the open session, and runs queued jobs strictly
//! one at a time in submission order.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;

use crate::config::ManagerConfig;
use crate::driver::{DeviceDriver, DriverFactory};
use crate::error::DeviceError;
use crate::event::DeviceEvent;
use crate::job::{Job, ProgressReporter};
use crate::model::{ConnectionInfo, DetectedDevice, DeviceKind, DriverProfile};
use crate::scanner::Scanner;

/// Commands sent from the DeviceManager to the background worker
pub(crate) enum Command {
    /// Append a job to the FIFO
    Job(Arc<Job>),
    /// Open a session on a driver built by the request's factory
    Mount(MountRequest),
    /// Eject or unmount the connected device
    Eject,
    Shutdown,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Job(job) => f.debug_tuple("Job").field(&job.id()).finish(),
            Command::Mount(request) => f
                .debug_struct("Mount")
                .field("kind", &request.kind)
                .field("path", &request.path)
                .finish(),
            Command::Eject => write!(f, "Eject"),
            Command::Shutdown => write!(f, "Shutdown"),
        }
    }
}

pub(crate) struct MountRequest {
    pub kind: DeviceKind,
    pub path: Option<PathBuf>,
    pub factory: DriverFactory,
}

/// Session state the worker publishes for queries from other threads
#[derive(Default)]
pub(crate) struct SharedState {
    pub connection: RwLock<Option<ConnectionInfo>>,
    pub generation: AtomicU64,
}

pub(crate) struct WorkerParts {
    pub config: ManagerConfig,
    pub scanner: Box<dyn Scanner>,
    pub drivers: Vec<Box<dyn DeviceDriver>>,
    pub commands: mpsc::Receiver<Command>,
    pub events: Arc<mpsc::Sender<DeviceEvent>>,
    pub shared: Arc<SharedState>,
}

/// Spawns the background device worker thread
pub(crate) fn spawn_device_worker(parts: WorkerParts) -> io::Result<JoinHandle<()>> {
    let worker = Worker {
        config: parts.config,
        scanner: parts.scanner,
        plugins: parts.drivers.into_iter().map(Some).collect(),
        commands: parts.commands,
        events: parts.events,
        shared: parts.shared,
        session: None,
        jobs: VecDeque::new(),
        mounts: Vec::new(),
        eject_requested: false,
        ejected: HashSet::new(),
        reported_errors: HashSet::new(),
        shutdown: false,
    };

    thread::Builder::new()
        .name("device-manager".to_string())
        .spawn(move || worker.run())
}

enum Origin {
    /// Borrowed from the plugin slot at this index
    Plugin(usize),
    /// Built by a mount request's factory
    Mounted,
}

struct Session {
    driver: Box<dyn DeviceDriver>,
    origin: Origin,
    kind: DeviceKind,
}

struct Worker {
    config: ManagerConfig,
    scanner: Box<dyn Scanner>,
    /// A slot is empty while its driver holds the session
    plugins: Vec<Option<Box<dyn DeviceDriver>>>,
    commands: mpsc::Receiver<Command>,
    events: Arc<mpsc::Sender<DeviceEvent>>,
    shared: Arc<SharedState>,
    session: Option<Session>,
    jobs: VecDeque<Arc<Job>>,
    mounts: Vec<MountRequest>,
    eject_requested: bool,
    /// Names of drivers the user ejected; not reconnected until unplugged
    ejected: HashSet<String>,
    reported_errors: HashSet<String>,
    shutdown: bool,
}

impl Worker {
    fn run(mut self) {
        tracing::info!("Device worker started");

        loop {
            self.drain_commands();
            if self.shutdown {
                break;
            }

            if std::mem::take(&mut self.eject_requested) {
                self.handle_eject();
            }

            match self.take_mount_request() {
                Some(request) => self.mount(request),
                None => self.detect(),
            }

            self.run_jobs();
            if self.shutdown {
                break;
            }

            self.idle();
            if self.shutdown {
                break;
            }
        }

        self.stop();
        tracing::info!("Device worker shut down");
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::Job(job) => self.jobs.push_back(job),
            Command::Mount(request) => self.mounts.push(request),
            Command::Eject => self.eject_requested = true,
            Command::Shutdown => {
                tracing::info!("Worker received shutdown command");
                self.shutdown = true;
            }
        }
    }

    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.dispatch(command),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    tracing::debug!("Manager dropped, shutting down worker");
                    self.shutdown = true;
                    break;
                }
            }
        }
    }

    /// Wait for the next iteration, returning early when a command arrives
    fn idle(&mut self) {
        match self.commands.recv_timeout(self.config.poll_interval) {
            Ok(command) => self.dispatch(command),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => self.shutdown = true,
        }
    }

    fn take_mount_request(&mut self) -> Option<MountRequest> {
        let newest = self.mounts.pop()?;
        if !self.mounts.is_empty() {
            tracing::debug!("Dropping {} superseded mount requests", self.mounts.len());
            self.mounts.clear();
        }
        Some(newest)
    }

    fn mount(&mut self, request: MountRequest) {
        if self.session.is_some() {
            tracing::warn!(
                "Ignoring {} mount request: a device is already connected",
                request.kind
            );
            return;
        }

        let driver = match (request.factory)(request.path.as_deref()) {
            Ok(driver) => driver,
            Err(e) => {
                self.report_connect_error(&request.kind.to_string(), &e);
                return;
            }
        };

        let detected = DetectedDevice {
            mount_path: request.path,
            ..Default::default()
        };
        // A failed mount has nowhere to return its driver to.
        let _ = self.try_open(driver, Some(detected), Origin::Mounted, request.kind);
    }

    fn detect(&mut self) {
        self.scanner.scan();

        if let Some(session) = &self.session {
            // Mounted sources stay until unmounted; the scanner does not know them.
            if matches!(session.origin, Origin::Mounted) {
                return;
            }
            if self
                .scanner
                .is_connected(session.driver.as_ref(), true)
                .is_none()
            {
                self.device_removed();
            }
            return;
        }

        self.forget_unplugged_ejected();

        let candidates = self.candidates();
        if candidates.is_empty() {
            return;
        }

        if !self.do_connect(&candidates, DeviceKind::Device) {
            tracing::debug!(
                "Connect to device failed, retrying in {:?}",
                self.config.retry_delay
            );
            thread::sleep(self.config.retry_delay);
            if !self.do_connect(&candidates, DeviceKind::Usb) {
                tracing::debug!("Device connect failed again, giving up");
            }
        }
    }

    /// Drop eject markers for devices that are no longer attached
    fn forget_unplugged_ejected(&mut self) {
        if self.ejected.is_empty() {
            return;
        }

        let still_present: HashSet<String> = self
            .plugins
            .iter()
            .flatten()
            .filter(|driver| self.ejected.contains(driver.name()))
            .filter(|driver| self.scanner.is_connected(driver.as_ref(), true).is_some())
            .map(|driver| driver.name().to_string())
            .collect();

        self.ejected.retain(|name| {
            let keep = still_present.contains(name);
            if !keep {
                tracing::debug!("Ejected device {} unplugged", name);
            }
            keep
        });
    }

    fn candidates(&self) -> Vec<(usize, DetectedDevice)> {
        self.plugins
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let driver = slot.as_ref()?;
                if self.ejected.contains(driver.name()) {
                    return None;
                }
                self.scanner
                    .is_connected(driver.as_ref(), false)
                    .map(|detected| (index, detected))
            })
            .collect()
    }

    /// Try each candidate in order until one opens
    fn do_connect(&mut self, candidates: &[(usize, DetectedDevice)], kind: DeviceKind) -> bool {
        for (index, detected) in candidates {
            let Some(driver) = self.plugins.get_mut(*index).and_then(Option::take) else {
                continue;
            };
            match self.try_open(driver, Some(detected.clone()), Origin::Plugin(*index), kind.clone()) {
                Ok(()) => return true,
                Err(driver) => self.plugins[*index] = Some(driver),
            }
        }
        false
    }

    /// Reset and open `driver`, binding the session on success
    ///
    /// Hands the driver back on failure.
    fn try_open(
        &mut self,
        mut driver: Box<dyn DeviceDriver>,
        detected: Option<DetectedDevice>,
        origin: Origin,
        kind: DeviceKind,
    ) -> Result<(), Box<dyn DeviceDriver>> {
        let profile = driver.profile();
        if let Some(feedback) = &profile.open_feedback {
            self.notify(DeviceEvent::OpenFeedback(feedback.clone()));
        }

        driver.reset(detected, ProgressReporter::noop());
        match driver.open() {
            Ok(()) => {
                self.bind_session(driver, profile, origin, kind);
                Ok(())
            }
            Err(e) => {
                let name = driver.name().to_string();
                self.report_connect_error(&name, &e);
                Err(driver)
            }
        }
    }

    fn bind_session(&mut self, driver: Box<dyn DeviceDriver>, profile: DriverProfile, origin: Origin, kind: DeviceKind) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let info = ConnectionInfo {
            kind: kind.clone(),
            driver_name: driver.name().to_string(),
            profile,
            generation,
        };
        tracing::info!(
            "Connected to {} ({}) as {}",
            info.profile.display_name,
            info.driver_name,
            kind
        );

        *self.shared.connection.write() = Some(info.clone());
        self.session = Some(Session { driver, origin, kind });
        self.notify(DeviceEvent::Connected(info));
    }

    fn report_connect_error(&mut self, name: &str, error: &DeviceError) {
        let key = format!("{}: {} {:?}", name, error, error);
        if self.config.verbose || self.reported_errors.insert(key) {
            tracing::warn!("Unable to open device {}: {}", name, error);
        } else {
            tracing::debug!("Unable to open device {} (already reported)", name);
        }
    }

    fn run_jobs(&mut self) {
        loop {
            self.drain_commands();
            if self.shutdown {
                return;
            }

            let Some(job) = self.jobs.pop_front() else {
                return;
            };

            match self.session.as_mut() {
                Some(session) => {
                    session.driver.set_progress_reporter(ProgressReporter::for_job(&job));
                    job.run(session.driver.as_mut());
                    session.driver.set_progress_reporter(ProgressReporter::noop());
                }
                None => {
                    tracing::debug!("No device for job {}", job.description());
                    job.abort(DeviceError::NotConnected);
                }
            }
        }
    }

    fn abort_jobs(&mut self, error: impl Fn() -> DeviceError) {
        for job in self.jobs.drain(..) {
            job.abort(error());
        }
    }

    /// Cleanup after the device vanished or was unmounted
    fn device_removed(&mut self) {
        self.drain_commands();
        self.abort_jobs(|| DeviceError::NotConnected);

        if let Some(mut session) = self.session.take() {
            tracing::info!("Device {} disconnected", session.driver.name());
            if let Err(e) = session.driver.post_yank_cleanup() {
                tracing::debug!("Post-removal cleanup failed: {}", e);
            }
            let kind = session.kind.clone();
            self.release(session);
            self.notify(DeviceEvent::Disconnected(kind));
        }
    }

    fn handle_eject(&mut self) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("Eject requested with no device connected");
            return;
        };

        let capabilities = session.driver.profile().capabilities;
        if capabilities.hard_eject {
            let name = session.driver.name().to_string();
            tracing::info!("Ejecting {}", name);
            if let Err(e) = session.driver.eject() {
                tracing::warn!("Eject of {} failed: {}", name, e);
            }
            self.ejected.insert(name);

            self.drain_commands();
            self.abort_jobs(|| DeviceError::NotConnected);
            if let Some(session) = self.session.take() {
                let kind = session.kind.clone();
                self.release(session);
                self.notify(DeviceEvent::Disconnected(kind));
            }
        } else if capabilities.supports_unmount {
            tracing::info!("Unmounting {}", session.driver.name());
            if let Err(e) = session.driver.unmount() {
                tracing::warn!("Unmount failed: {}", e);
            }
            self.device_removed();
        } else {
            tracing::warn!("Connected device {} cannot be ejected", session.driver.name());
        }
    }

    /// Close the session, returning a plugin driver to its slot
    fn release(&mut self, session: Session) {
        *self.shared.connection.write() = None;
        match session.origin {
            Origin::Plugin(index) => self.plugins[index] = Some(session.driver),
            Origin::Mounted => drop(session.driver),
        }
    }

    fn stop(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Job(job) = command {
                self.jobs.push_back(job);
            }
        }
        self.abort_jobs(|| DeviceError::WorkerStopped);

        if let Some(session) = self.session.take() {
            self.release(session);
        }
    }

    fn notify(&self, event: DeviceEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}
