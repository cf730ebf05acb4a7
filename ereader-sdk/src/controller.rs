//! DeviceController - the controlling-thread side of device management
//!
//! Owns the device manager, the host library handle, the reconciliation
//! caches and the current booklists. Everything here runs on the thread that
//! calls [`DeviceController::process_events`]; the device worker only ever
//! talks to it through [`DeviceEvent`]s.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ereader_device::{
    BookId, Booklists, Card, DeviceEvent, DeviceEvents, DeviceInformation, DeviceKind, DeviceManager,
    DeviceManagerBuilder, DoneCallback, DriverFactory, FeedbackLevel, Job, JobId, JobOutput, LibraryRecord,
    StorageStatus,
};
use ereader_match::{Library, OnDevice, Reconciler};

use crate::config::ControllerConfig;
use crate::error::{SdkError, SdkResult};
use crate::feedback::Feedback;
use crate::outbox::{BatchId, DeliveryReport, OutgoingMessage, Outbox};
use crate::presenter::Presenter;

/// What to do once a controller-issued job is done
#[derive(Debug)]
enum FollowUp {
    DeviceInfo,
    Books,
    MetadataSync,
    Upload {
        metadata: Vec<LibraryRecord>,
        titles: Vec<String>,
    },
    Delete,
    /// Only failures are reported; results go to the caller's callback
    Report,
}

/// Sync-first controller for one e-reader
///
/// # Example
///
/// ```rust,ignore
/// use ereader_sdk::{ControllerConfig, DeviceController, NullPresenter};
///
/// let manager = DeviceManager::builder().scanner(scanner).driver(driver);
/// let mut controller = DeviceController::builder(manager, library, NullPresenter)
///     .config(ControllerConfig::from_json(&settings)?)
///     .build()?;
///
/// loop {
///     controller.wait_for_events(Duration::from_millis(100));
/// }
/// ```
pub struct DeviceController<L: Library, P: Presenter> {
    manager: DeviceManager,
    events: DeviceEvents,
    library: L,
    presenter: P,
    config: ControllerConfig,
    reconciler: Reconciler,
    booklists: Booklists,
    follow_ups: HashMap<JobId, FollowUp>,
    connected: Option<DeviceKind>,
    device_info: Option<DeviceInformation>,
    storage: Option<StorageStatus>,
    folder_driver: Option<DriverFactory>,
    outbox: Option<Outbox>,
}

impl<L: Library, P: Presenter> DeviceController<L, P> {
    pub fn builder(manager: DeviceManagerBuilder, library: L, presenter: P) -> ControllerBuilder<L, P> {
        ControllerBuilder {
            manager,
            library,
            presenter,
            config: ControllerConfig::default(),
            folder_driver: None,
            outbox: None,
        }
    }

    pub fn manager(&self) -> &DeviceManager {
        &self.manager
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    /// Mutable library access
    ///
    /// Call [`DeviceController::refresh_ondevice`] after edits that change
    /// titles, authors or uuids.
    pub fn library_mut(&mut self) -> &mut L {
        &mut self.library
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn booklists(&self) -> &Booklists {
        &self.booklists
    }

    /// Kind of the open session, `None` while disconnected
    pub fn connected(&self) -> Option<&DeviceKind> {
        self.connected.as_ref()
    }

    pub fn device_info(&self) -> Option<&DeviceInformation> {
        self.device_info.as_ref()
    }

    pub fn storage(&self) -> Option<&StorageStatus> {
        self.storage.as_ref()
    }

    pub fn has_card(&self) -> bool {
        self.storage.as_ref().is_some_and(|s| s.card_prefix.has_card())
    }

    /// Handle every event already waiting; returns how many were handled
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled + self.process_deliveries()
    }

    /// Block up to `timeout` for the first event, then handle the backlog
    pub fn wait_for_events(&mut self, timeout: Duration) -> usize {
        match self.events.recv_timeout(timeout) {
            Some(event) => {
                self.handle_event(event);
                1 + self.process_events()
            }
            None => self.process_deliveries(),
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Upload files with their library metadata
    pub fn upload_books(
        &mut self,
        files: Vec<PathBuf>,
        names: Vec<String>,
        metadata: Vec<LibraryRecord>,
        on_card: Option<Card>,
    ) -> SdkResult<Arc<Job>> {
        let titles: Vec<String> = metadata.iter().map(|m| m.title.clone()).collect();
        let job = self
            .manager
            .upload_books(files, names, on_card, metadata.clone(), &titles, None)?;
        self.follow_ups.insert(job.id(), FollowUp::Upload { metadata, titles });
        Ok(job)
    }

    pub fn delete_books(&mut self, paths: Vec<String>) -> SdkResult<Arc<Job>> {
        let job = self.manager.delete_books(paths, None)?;
        self.follow_ups.insert(job.id(), FollowUp::Delete);
        Ok(job)
    }

    /// Write the current booklists back to the device
    pub fn sync_booklists(&mut self) -> SdkResult<Arc<Job>> {
        let job = self.manager.sync_booklists(self.booklists.clone(), None)?;
        self.follow_ups.insert(job.id(), FollowUp::MetadataSync);
        Ok(job)
    }

    pub fn fetch_annotations(
        &mut self,
        path_map: HashMap<BookId, String>,
        done: Option<DoneCallback>,
    ) -> SdkResult<Arc<Job>> {
        let job = self.manager.annotations(path_map, done)?;
        self.follow_ups.insert(job.id(), FollowUp::Report);
        Ok(job)
    }

    pub fn save_books(
        &mut self,
        paths: Vec<String>,
        target_dir: PathBuf,
        done: Option<DoneCallback>,
    ) -> SdkResult<Arc<Job>> {
        let job = self.manager.save_books(paths, target_dir, done)?;
        self.follow_ups.insert(job.id(), FollowUp::Report);
        Ok(job)
    }

    pub fn view_book(&mut self, path: String, target: PathBuf, done: Option<DoneCallback>) -> SdkResult<Arc<Job>> {
        let job = self.manager.view_book(path, target, done)?;
        self.follow_ups.insert(job.id(), FollowUp::Report);
        Ok(job)
    }

    /// Where a library book is on the device
    pub fn book_on_device(&mut self, id: BookId) -> OnDevice {
        self.reconciler.book_on_device(&self.library, &self.booklists, id)
    }

    /// Drop cached on-device answers and tell the presenter
    pub fn refresh_ondevice(&mut self) {
        self.reconciler.reset();
        self.presenter.booklists_changed(&self.booklists);
    }

    /// Mount a folder as the device
    pub fn connect_to_folder(&self, folder: impl Into<PathBuf>) -> SdkResult<()> {
        let folder = folder.into();
        if !folder.is_dir() {
            return Err(SdkError::NotADirectory(folder));
        }
        let factory = self.folder_driver.clone().ok_or(SdkError::NoFolderDriver)?;

        tracing::info!("Connecting to folder {}", folder.display());
        self.manager.mount_device(DeviceKind::Folder, Some(folder), factory)?;
        Ok(())
    }

    /// Eject the device or release a mounted folder
    pub fn disconnect_mounted_device(&self) -> SdkResult<()> {
        self.manager.umount_device()?;
        Ok(())
    }

    /// Queue messages on the outbox
    pub fn send_by_mail(&mut self, messages: Vec<OutgoingMessage>) -> SdkResult<BatchId> {
        let outbox = self.outbox.as_ref().ok_or(SdkError::OutboxStopped)?;
        let to: Vec<&str> = messages.iter().map(|m| m.to.as_str()).collect();
        let message = format!("Sending email to {}", to.join(", "));
        let batch = outbox.send(messages)?;

        self.presenter.status_message(&message);
        Ok(batch)
    }

    /// Stop both workers
    pub fn shutdown(&mut self) {
        if let Some(mut outbox) = self.outbox.take() {
            outbox.stop();
        }
        self.manager.shutdown();
        self.follow_ups.clear();
    }

    // ========================================================================
    // Event dispatch
    // ========================================================================

    fn handle_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Connected(info) => {
                tracing::info!("Device connected: {} ({})", info.profile.display_name, info.kind);
                self.connected = Some(info.kind.clone());
                self.reconciler.observe_session(info.generation);
                self.presenter.device_connected(&info);
                self.presenter
                    .status_message(&format!("Device: {} detected.", info.profile.display_name));
                self.queue(FollowUp::DeviceInfo, |manager| manager.get_device_information(None));
            }
            DeviceEvent::Disconnected(kind) => {
                tracing::info!("Device disconnected ({})", kind);
                self.connected = None;
                self.device_info = None;
                self.storage = None;
                self.booklists = Booklists::default();
                self.reconciler.reset();
                self.presenter.device_disconnected(&kind);
                self.presenter.booklists_changed(&self.booklists);
            }
            DeviceEvent::OpenFeedback(message) => self.presenter.status_message(&message),
            DeviceEvent::JobDone(job) => {
                if let Some(done) = job.take_done_callback() {
                    done(&job);
                }
                if let Some(follow_up) = self.follow_ups.remove(&job.id()) {
                    self.follow_up(&job, follow_up);
                }
            }
        }
    }

    fn follow_up(&mut self, job: &Arc<Job>, follow_up: FollowUp) {
        let titles: &[String] = match &follow_up {
            FollowUp::Upload { titles, .. } => titles.as_slice(),
            _ => &[],
        };
        if let Some(feedback) = Feedback::classify(job, titles) {
            tracing::debug!("Job {} failed: {}", job.description(), feedback.title());
            self.presenter.show_feedback(&feedback);
            return;
        }

        match (follow_up, job.take_result()) {
            (FollowUp::DeviceInfo, Some(JobOutput::DeviceInfo(info))) => self.info_read(info),
            (FollowUp::Books, Some(JobOutput::Books(booklists))) => self.booklists_read(booklists),
            (FollowUp::MetadataSync, Some(JobOutput::Synced(status))) => {
                self.presenter.storage_changed(&status);
                self.storage = Some(status);
            }
            (FollowUp::Upload { metadata, .. }, Some(JobOutput::Uploaded(uploaded))) => {
                self.booklists.add_uploaded(&uploaded, &metadata);
                self.reconciler.set_books_in_library(
                    &self.library,
                    &mut self.booklists,
                    false,
                    self.config.metadata_management,
                );
                self.reconciler.reset();
                self.queue_metadata_sync();
                self.presenter.booklists_changed(&self.booklists);
            }
            (FollowUp::Delete, Some(JobOutput::Deleted(paths))) => {
                let removed = self.booklists.remove_paths(&paths);
                tracing::debug!("Removed {} records after deleting {} paths", removed, paths.len());
                self.reconciler.reset();
                self.queue_metadata_sync();
                self.presenter.booklists_changed(&self.booklists);
            }
            (FollowUp::Report, _) => {}
            (follow_up, result) => {
                tracing::warn!("Unexpected result {:?} for {:?}", result, follow_up);
            }
        }
    }

    fn info_read(&mut self, info: DeviceInformation) {
        if let Some(model) = info.model() {
            self.presenter.status_message(model);
        }
        self.presenter.device_info(&info);
        let status = StorageStatus {
            card_prefix: info.card_prefix.clone(),
            free_space: info.free_space,
        };
        self.presenter.storage_changed(&status);
        self.storage = Some(status);
        self.device_info = Some(info);

        self.queue(FollowUp::Books, |manager| manager.books(None));
    }

    fn booklists_read(&mut self, booklists: Booklists) {
        self.booklists = booklists;
        let summary = self.reconciler.set_books_in_library(
            &self.library,
            &mut self.booklists,
            true,
            self.config.metadata_management,
        );
        tracing::info!(
            "Read {} books from device ({} in library)",
            self.booklists.len(),
            summary.matched
        );
        self.reconciler.reset();
        self.presenter.booklists_changed(&self.booklists);

        if summary.metadata_updated {
            self.queue_metadata_sync();
        }
    }

    fn queue_metadata_sync(&mut self) {
        let booklists = self.booklists.clone();
        self.queue(FollowUp::MetadataSync, move |manager| manager.sync_booklists(booklists, None));
    }

    fn queue<F>(&mut self, follow_up: FollowUp, create: F)
    where
        F: FnOnce(&DeviceManager) -> ereader_device::ManagerResult<Arc<Job>>,
    {
        match create(&self.manager) {
            Ok(job) => {
                self.follow_ups.insert(job.id(), follow_up);
            }
            Err(e) => tracing::warn!("Could not queue {:?}: {}", follow_up, e),
        }
    }

    fn process_deliveries(&mut self) -> usize {
        let mut handled = 0;
        while let Some(report) = self.outbox.as_ref().and_then(Outbox::try_report) {
            self.delivery_done(report);
            handled += 1;
        }
        handled
    }

    fn delivery_done(&mut self, report: DeliveryReport) {
        if report.is_success() {
            let message = format!("Sent by email: {}", report.sent_titles().join(", "));
            self.presenter.status_message(&message);
            return;
        }

        let details = report
            .failures()
            .map(|d| format!("{}\n\n{}\n", d.title(), d.error.as_deref().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n");
        self.presenter.show_feedback(&Feedback::Dialog {
            level: FeedbackLevel::Error,
            message: "Failed to email the following books:".to_string(),
            details: Some(details),
        });
    }
}

/// Builder for [`DeviceController`]
pub struct ControllerBuilder<L: Library, P: Presenter> {
    manager: DeviceManagerBuilder,
    library: L,
    presenter: P,
    config: ControllerConfig,
    folder_driver: Option<DriverFactory>,
    outbox: Option<Outbox>,
}

impl<L: Library, P: Presenter> ControllerBuilder<L, P> {
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Driver factory used by [`DeviceController::connect_to_folder`]
    pub fn folder_driver(mut self, factory: DriverFactory) -> Self {
        self.folder_driver = Some(factory);
        self
    }

    pub fn outbox(mut self, outbox: Outbox) -> Self {
        self.outbox = Some(outbox);
        self
    }

    /// Start the device worker and mount the auto-connect folder, if any
    pub fn build(self) -> SdkResult<DeviceController<L, P>> {
        let manager = self.manager.config(self.config.manager_config()).build()?;
        let events = manager.events();

        let controller = DeviceController {
            manager,
            events,
            library: self.library,
            presenter: self.presenter,
            config: self.config,
            reconciler: Reconciler::new(),
            booklists: Booklists::default(),
            follow_ups: HashMap::new(),
            connected: None,
            device_info: None,
            storage: None,
            folder_driver: self.folder_driver,
            outbox: self.outbox,
        };

        if let Some(folder) = controller.config.auto_connect_folder.clone() {
            match controller.connect_to_folder(folder.clone()) {
                Ok(()) => {}
                Err(SdkError::NotADirectory(_)) => {
                    tracing::warn!("Auto-connect folder {} is not a directory", folder.display())
                }
                Err(e) => return Err(e),
            }
        }

        Ok(controller)
    }
}
