//! Background worker delivering outbound messages (books sent by email)
//!
//! Batches are delivered strictly in submission order, one at a time, by a
//! single thread that polls its queue on a fixed interval. The outcome of
//! each batch comes back as a [`DeliveryReport`] that the owner drains.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::error::{SdkError, SdkResult};

/// Configuration for the outbox worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxConfig {
    /// How often the worker looks for queued batches
    /// Default: 1 second
    pub poll_interval: Duration,

    /// Per-message timeout handed to the transport
    /// Default: 60 seconds
    pub timeout: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

impl OutboxConfig {
    /// Short poll interval for tests
    pub fn fast() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }
}

/// One message with a single attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// `"<kind>:<book title>"`
    pub job_name: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub attachment: PathBuf,
    pub attachment_name: String,
}

impl OutgoingMessage {
    /// Book title part of the job name
    pub fn title(&self) -> &str {
        title_of(&self.job_name)
    }
}

fn title_of(job_name: &str) -> &str {
    job_name.split_once(':').map_or("", |(_, title)| title)
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Message rejected: {0}")]
    Rejected(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Delivers a single message; implemented by the embedding application
pub trait Transport: Send {
    fn send(&mut self, message: &OutgoingMessage, timeout: Duration) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(u64);

/// Outcome of one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub job_name: String,
    /// Failure text, `None` when the message went out
    pub error: Option<String>,
}

impl Delivery {
    pub fn title(&self) -> &str {
        title_of(&self.job_name)
    }

    pub fn is_sent(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one batch, in message order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub batch: BatchId,
    pub deliveries: Vec<Delivery>,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.deliveries.iter().all(Delivery::is_sent)
    }

    pub fn sent_titles(&self) -> Vec<&str> {
        self.deliveries
            .iter()
            .filter(|d| d.is_sent())
            .map(Delivery::title)
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries.iter().filter(|d| !d.is_sent())
    }
}

enum OutboxCommand {
    Batch(BatchId, Vec<OutgoingMessage>),
    Stop,
}

/// Handle to the outbox worker
pub struct Outbox {
    command_tx: mpsc::Sender<OutboxCommand>,
    report_rx: mpsc::Receiver<DeliveryReport>,
    next_batch: AtomicU64,
    worker: Option<JoinHandle<()>>,
}

impl Outbox {
    /// Spawn the worker
    pub fn start(transport: impl Transport + 'static, config: OutboxConfig) -> SdkResult<Self> {
        let (command_tx, command_rx) = mpsc::channel();
        let (report_tx, report_rx) = mpsc::channel();

        let worker = thread::Builder::new().name("outbox".to_string()).spawn(move || {
            OutboxWorker {
                transport: Box::new(transport),
                config,
                commands: command_rx,
                reports: report_tx,
                queue: VecDeque::new(),
            }
            .run()
        })?;

        Ok(Self {
            command_tx,
            report_rx,
            next_batch: AtomicU64::new(1),
            worker: Some(worker),
        })
    }

    /// Queue a batch behind any earlier ones
    pub fn send(&self, messages: Vec<OutgoingMessage>) -> SdkResult<BatchId> {
        let batch = BatchId(self.next_batch.fetch_add(1, Ordering::SeqCst));
        self.command_tx
            .send(OutboxCommand::Batch(batch, messages))
            .map_err(|_| SdkError::OutboxStopped)?;
        Ok(batch)
    }

    /// Next finished batch, without blocking
    pub fn try_report(&self) -> Option<DeliveryReport> {
        self.report_rx.try_recv().ok()
    }

    pub fn report_timeout(&self, timeout: Duration) -> Option<DeliveryReport> {
        self.report_rx.recv_timeout(timeout).ok()
    }

    /// Stop after the batch in flight; queued batches are dropped
    pub fn stop(&mut self) {
        let _ = self.command_tx.send(OutboxCommand::Stop);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Outbox worker panicked");
            }
        }
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        let _ = self.command_tx.send(OutboxCommand::Stop);
    }
}

struct OutboxWorker {
    transport: Box<dyn Transport>,
    config: OutboxConfig,
    commands: mpsc::Receiver<OutboxCommand>,
    reports: mpsc::Sender<DeliveryReport>,
    queue: VecDeque<(BatchId, Vec<OutgoingMessage>)>,
}

impl OutboxWorker {
    fn run(mut self) {
        tracing::debug!("Outbox worker started");
        loop {
            if !self.drain_commands() {
                break;
            }

            if let Some((batch, messages)) = self.queue.pop_front() {
                let report = self.deliver(batch, &messages);
                if self.reports.send(report).is_err() {
                    tracing::debug!("Outbox owner gone, stopping");
                    break;
                }
            }

            match self.commands.recv_timeout(self.config.poll_interval) {
                Ok(OutboxCommand::Batch(batch, messages)) => self.queue.push_back((batch, messages)),
                Ok(OutboxCommand::Stop) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {}
            }
        }

        if !self.queue.is_empty() {
            tracing::warn!("Outbox stopped with {} undelivered batches", self.queue.len());
        }
        tracing::debug!("Outbox worker stopped");
    }

    /// Returns false once the worker should stop
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(OutboxCommand::Batch(batch, messages)) => self.queue.push_back((batch, messages)),
                Ok(OutboxCommand::Stop) | Err(mpsc::TryRecvError::Disconnected) => return false,
                Err(mpsc::TryRecvError::Empty) => return true,
            }
        }
    }

    fn deliver(&mut self, batch: BatchId, messages: &[OutgoingMessage]) -> DeliveryReport {
        let deliveries = messages
            .iter()
            .map(|message| {
                let error = match self.transport.send(message, self.config.timeout) {
                    Ok(()) => {
                        tracing::info!("Sent {} to {}", message.job_name, message.to);
                        None
                    }
                    Err(e) => {
                        tracing::warn!("Failed to send {} to {}: {}", message.job_name, message.to, e);
                        Some(e.to_string())
                    }
                };
                Delivery {
                    job_name: message.job_name.clone(),
                    error,
                }
            })
            .collect();

        DeliveryReport { batch, deliveries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, message: &OutgoingMessage, _timeout: Duration) -> Result<(), TransportError> {
            if message.to.is_empty() {
                return Err(TransportError::Rejected("no recipient".into()));
            }
            self.sent.lock().push(message.job_name.clone());
            Ok(())
        }
    }

    fn message(job_name: &str, to: &str) -> OutgoingMessage {
        OutgoingMessage {
            job_name: job_name.to_string(),
            to: to.to_string(),
            subject: "Book".to_string(),
            text: String::new(),
            attachment: PathBuf::from("/tmp/book.epub"),
            attachment_name: "book.epub".to_string(),
        }
    }

    #[test]
    fn test_batches_delivered_in_order() {
        let transport = RecordingTransport::default();
        let sent = Arc::clone(&transport.sent);
        let mut outbox = Outbox::start(transport, OutboxConfig::fast()).unwrap();

        let first = outbox.send(vec![message("Email:Dune", "a@example.com")]).unwrap();
        let second = outbox
            .send(vec![message("Email:Emma", "a@example.com"), message("Email:Persuasion", "")])
            .unwrap();

        let timeout = Duration::from_secs(5);
        let report = outbox.report_timeout(timeout).unwrap();
        assert_eq!(report.batch, first);
        assert!(report.is_success());
        assert_eq!(report.sent_titles(), vec!["Dune"]);

        let report = outbox.report_timeout(timeout).unwrap();
        assert_eq!(report.batch, second);
        assert!(!report.is_success());
        assert_eq!(report.sent_titles(), vec!["Emma"]);
        let failures: Vec<_> = report.failures().map(Delivery::title).collect();
        assert_eq!(failures, vec!["Persuasion"]);

        outbox.stop();
        assert_eq!(*sent.lock(), vec!["Email:Dune".to_string(), "Email:Emma".to_string()]);
    }

    #[test]
    fn test_send_after_stop_fails() {
        let mut outbox = Outbox::start(RecordingTransport::default(), OutboxConfig::fast()).unwrap();
        outbox.stop();
        assert!(matches!(outbox.send(vec![]), Err(SdkError::OutboxStopped)));
    }

    #[test]
    fn test_title_without_prefix() {
        assert_eq!(message("Dune", "a").title(), "");
        assert_eq!(message("Email:Dune: Messiah", "a").title(), "Dune: Messiah");
    }
}
