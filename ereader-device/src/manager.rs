//! Sync-first device manager
//!
//! Provides a synchronous, non-blocking API for queueing device jobs. All
//! device I/O happens on one background worker thread; results come back
//! through [`DeviceManager::events`].

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Weak};
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::config::ManagerConfig;
use crate::driver::{DeviceDriver, DriverFactory};
use crate::error::{DeviceError, ManagerError, ManagerResult};
use crate::event::DeviceEvent;
use crate::iter::DeviceEvents;
use crate::job::{DoneCallback, Job, JobFn, JobOutput};
use crate::model::{
    BookId, Booklists, Card, ConnectionInfo, DeviceInformation, DeviceKind, LibraryRecord, StorageStatus,
};
use crate::scanner::{NullScanner, Scanner};
use crate::tracker::{JobRegistry, JobTracker};
use crate::worker::{spawn_device_worker, Command, MountRequest, SharedState, WorkerParts};

/// Manager for a single attached e-reader
///
/// Every method returns immediately: jobs are queued for the worker and
/// reported back as [`DeviceEvent::JobDone`].
///
/// # Example
///
/// ```rust,ignore
/// use ereader_device::prelude::*;
///
/// let manager = DeviceManager::builder()
///     .scanner(UsbScanner::new())
///     .driver(KindleDriver::new())
///     .build()?;
///
/// let events = manager.events();
/// for event in events {
///     if let DeviceEvent::Connected(info) = event {
///         manager.books(None)?;
///     }
/// }
/// ```
pub struct DeviceManager {
    /// Send commands to background worker
    command_tx: mpsc::Sender<Command>,

    /// Handed to every job so it can post its own completion; the worker
    /// holds the only strong reference
    event_tx: Weak<mpsc::Sender<DeviceEvent>>,

    /// Receive events from background worker
    event_rx: Arc<Mutex<mpsc::Receiver<DeviceEvent>>>,

    shared: Arc<SharedState>,

    tracker: Arc<dyn JobTracker>,

    worker: Option<JoinHandle<()>>,
}

impl DeviceManager {
    /// Create a builder for configuring the manager
    pub fn builder() -> DeviceManagerBuilder {
        DeviceManagerBuilder::default()
    }

    /// Get a blocking iterator over worker events
    pub fn events(&self) -> DeviceEvents {
        DeviceEvents::new(Arc::clone(&self.event_rx))
    }

    pub fn is_device_connected(&self) -> bool {
        self.shared.connection.read().is_some()
    }

    /// The open session, if any
    pub fn connection(&self) -> Option<ConnectionInfo> {
        self.shared.connection.read().clone()
    }

    /// Number of sessions opened so far
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    pub fn tracker(&self) -> Arc<dyn JobTracker> {
        Arc::clone(&self.tracker)
    }

    /// Queue a job and return it immediately
    pub fn create_job(
        &self,
        func: JobFn,
        done: Option<DoneCallback>,
        description: impl Into<String>,
    ) -> ManagerResult<Arc<Job>> {
        let job = Job::tracked(
            func,
            done,
            description.into(),
            Arc::clone(&self.tracker),
            Weak::clone(&self.event_tx),
        );
        self.tracker.add_job(&job);

        if let Err(mpsc::SendError(Command::Job(job))) = self.command_tx.send(Command::Job(Arc::clone(&job))) {
            job.abort(DeviceError::WorkerStopped);
            return Err(ManagerError::WorkerStopped);
        }

        tracing::debug!("Queued job {}: {}", job.id(), job.description());
        Ok(job)
    }

    /// Get device information and free space on the device
    pub fn get_device_information(&self, done: Option<DoneCallback>) -> ManagerResult<Arc<Job>> {
        self.create_job(
            Box::new(|driver| {
                let info = driver.device_information()?;
                let card_prefix = driver.card_prefix()?;
                let free_space = driver.free_space()?;
                Ok(JobOutput::DeviceInfo(DeviceInformation::from_raw(
                    info,
                    card_prefix,
                    free_space,
                )))
            }),
            done,
            "Get device information",
        )
    }

    /// Get the book lists of main memory and both cards
    pub fn books(&self, done: Option<DoneCallback>) -> ManagerResult<Arc<Job>> {
        self.create_job(
            Box::new(|driver| {
                let main = driver.books(None)?;
                let card_a = driver.books(Some(Card::A))?;
                let card_b = driver.books(Some(Card::B))?;
                Ok(JobOutput::Books(Booklists::new(main, card_a, card_b)))
            }),
            done,
            "Get list of books on device",
        )
    }

    /// Read annotations for the books at the given device paths
    pub fn annotations(
        &self,
        path_map: HashMap<BookId, String>,
        done: Option<DoneCallback>,
    ) -> ManagerResult<Arc<Job>> {
        self.create_job(
            Box::new(move |driver| {
                if !driver.profile().capabilities.supports_annotations {
                    return Err(DeviceError::Unsupported {
                        operation: "annotations",
                    });
                }
                Ok(JobOutput::Annotations(driver.annotations(&path_map)?))
            }),
            done,
            "Get annotations from device",
        )
    }

    /// Write the booklists to the device and report the storage status
    pub fn sync_booklists(&self, booklists: Booklists, done: Option<DoneCallback>) -> ManagerResult<Arc<Job>> {
        self.create_job(
            Box::new(move |driver| {
                driver.sync_booklists(&booklists)?;
                Ok(JobOutput::Synced(StorageStatus {
                    card_prefix: driver.card_prefix()?,
                    free_space: driver.free_space()?,
                }))
            }),
            done,
            "Send metadata to device",
        )
    }

    /// Upload files to the device
    ///
    /// `titles` only feed the job description.
    pub fn upload_books(
        &self,
        files: Vec<PathBuf>,
        names: Vec<String>,
        on_card: Option<Card>,
        metadata: Vec<LibraryRecord>,
        titles: &[String],
        done: Option<DoneCallback>,
    ) -> ManagerResult<Arc<Job>> {
        let description = upload_description(names.len(), titles);
        self.create_job(
            Box::new(move |driver| {
                Ok(JobOutput::Uploaded(driver.upload_books(
                    &files, &names, on_card, &metadata,
                )?))
            }),
            done,
            description,
        )
    }

    pub fn delete_books(&self, paths: Vec<String>, done: Option<DoneCallback>) -> ManagerResult<Arc<Job>> {
        self.create_job(
            Box::new(move |driver| {
                driver.delete_books(&paths)?;
                Ok(JobOutput::Deleted(paths))
            }),
            done,
            "Delete books from device",
        )
    }

    /// Copy books from the device into `target_dir`
    pub fn save_books(
        &self,
        paths: Vec<String>,
        target_dir: PathBuf,
        done: Option<DoneCallback>,
    ) -> ManagerResult<Arc<Job>> {
        self.create_job(
            Box::new(move |driver| save_files(driver, &paths, &target_dir).map(JobOutput::Saved)),
            done,
            "Download books from device",
        )
    }

    /// Copy one book to `target` for viewing
    pub fn view_book(&self, path: String, target: PathBuf, done: Option<DoneCallback>) -> ManagerResult<Arc<Job>> {
        self.create_job(
            Box::new(move |driver| {
                let mut file = File::create(&target)?;
                driver.get_file(&path, &mut file)?;
                Ok(JobOutput::Viewed(target))
            }),
            done,
            "View book on device",
        )
    }

    /// Open a non-USB source (folder, iTunes) as the device
    ///
    /// The factory runs on the worker. Ignored while a device is connected.
    pub fn mount_device(&self, kind: DeviceKind, path: Option<PathBuf>, factory: DriverFactory) -> ManagerResult<()> {
        tracing::debug!("Mount requested: {} {:?}", kind, path);
        self.send(Command::Mount(MountRequest { kind, path, factory }))
    }

    /// Eject or unmount the connected device
    ///
    /// The worker does the actual eject; this never calls into a driver.
    pub fn umount_device(&self) -> ManagerResult<()> {
        let Some(info) = self.connection() else {
            return Err(ManagerError::NotConnected);
        };
        if self.tracker.has_device_jobs() {
            return Err(ManagerError::DeviceBusy);
        }

        let capabilities = info.profile.capabilities;
        if !capabilities.hard_eject && !capabilities.supports_unmount {
            return Err(ManagerError::Unsupported);
        }

        self.send(Command::Eject)
    }

    /// Stop the worker and wait for it to exit
    ///
    /// Jobs still queued fail with [`DeviceError::WorkerStopped`]. Event
    /// iterators end once the remaining events are drained.
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Device worker panicked");
            }
        }
    }

    fn send(&self, command: Command) -> ManagerResult<()> {
        self.command_tx
            .send(command)
            .map_err(|_| ManagerError::WorkerStopped)
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        tracing::debug!("DeviceManager dropping");
        let _ = self.command_tx.send(Command::Shutdown);
    }
}

fn upload_description(count: usize, titles: &[String]) -> String {
    let mut description = format!("Upload {} books to device", count);
    if !titles.is_empty() {
        description.push_str(": ");
        description.push_str(&titles.join(", "));
    }
    description
}

fn save_files(driver: &mut dyn DeviceDriver, paths: &[String], target_dir: &Path) -> crate::error::Result<Vec<PathBuf>> {
    let mut saved = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(name) = Path::new(path).file_name() else {
            tracing::warn!("Skipping device path without a file name: {}", path);
            continue;
        };
        let dest = target_dir.join(name);
        if dest == Path::new(path) {
            continue;
        }
        let mut file = File::create(&dest)?;
        driver.get_file(path, &mut file)?;
        saved.push(dest);
    }
    Ok(saved)
}

/// Builder for [`DeviceManager`]
#[derive(Default)]
pub struct DeviceManagerBuilder {
    scanner: Option<Box<dyn Scanner>>,
    drivers: Vec<Box<dyn DeviceDriver>>,
    tracker: Option<Arc<dyn JobTracker>>,
    config: ManagerConfig,
}

impl DeviceManagerBuilder {
    /// Scanner used for detection; defaults to one that finds nothing
    pub fn scanner(mut self, scanner: impl Scanner + 'static) -> Self {
        self.scanner = Some(Box::new(scanner));
        self
    }

    /// Add a plugin driver; candidates are tried in the order added
    pub fn driver(mut self, driver: impl DeviceDriver + 'static) -> Self {
        self.drivers.push(Box::new(driver));
        self
    }

    pub fn drivers(mut self, drivers: impl IntoIterator<Item = Box<dyn DeviceDriver>>) -> Self {
        self.drivers.extend(drivers);
        self
    }

    /// Job tracker; defaults to a fresh [`JobRegistry`]
    pub fn tracker(mut self, tracker: Arc<dyn JobTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and spawn the worker
    pub fn build(self) -> ManagerResult<DeviceManager> {
        self.config.validate()?;

        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let event_tx = Arc::new(event_tx);
        let shared = Arc::new(SharedState::default());

        let worker = spawn_device_worker(WorkerParts {
            config: self.config,
            scanner: self.scanner.unwrap_or_else(|| Box::new(NullScanner)),
            drivers: self.drivers,
            commands: command_rx,
            events: Arc::clone(&event_tx),
            shared: Arc::clone(&shared),
        })
        .map_err(|e| ManagerError::InvalidConfig(format!("Failed to spawn device worker: {}", e)))?;

        Ok(DeviceManager {
            command_tx,
            event_tx: Arc::downgrade(&event_tx),
            event_rx: Arc::new(Mutex::new(event_rx)),
            shared,
            tracker: self
                .tracker
                .unwrap_or_else(|| Arc::new(JobRegistry::new())),
            worker: Some(worker),
        })
    }
}
