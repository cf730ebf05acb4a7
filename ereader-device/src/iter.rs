//! Sync iterator for consuming events from the DeviceManager
//!
//! Provides a blocking iterator interface for the controlling thread to
//! drain connection changes and job completions.

use std::sync::{mpsc, Arc};
use std::time::Duration;

use parking_lot::Mutex;

use crate::event::DeviceEvent;

/// Blocking iterator over device events
///
/// This iterator blocks on `next()` until an event is available or the
/// worker has shut down. Use `try_recv()` for non-blocking access.
pub struct DeviceEvents {
    rx: Arc<Mutex<mpsc::Receiver<DeviceEvent>>>,
}

impl DeviceEvents {
    pub(crate) fn new(rx: Arc<Mutex<mpsc::Receiver<DeviceEvent>>>) -> Self {
        Self { rx }
    }

    /// Block until an event is available
    ///
    /// Returns `None` once the worker is gone.
    pub fn recv(&self) -> Option<DeviceEvent> {
        self.rx.lock().recv().ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<DeviceEvent> {
        self.rx.lock().try_recv().ok()
    }

    /// Block until an event is available or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DeviceEvent> {
        self.rx.lock().recv_timeout(timeout).ok()
    }

    /// Non-blocking iterator over currently available events
    pub fn try_iter(&self) -> TryIterator<'_> {
        TryIterator { inner: self }
    }

    /// Blocking iterator that gives up after `timeout` on each `next()`
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIterator<'_> {
        TimeoutIterator {
            inner: self,
            timeout,
        }
    }
}

impl Iterator for DeviceEvents {
    type Item = DeviceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Clone for DeviceEvents {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

pub struct TryIterator<'a> {
    inner: &'a DeviceEvents,
}

impl<'a> Iterator for TryIterator<'a> {
    type Item = DeviceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

pub struct TimeoutIterator<'a> {
    inner: &'a DeviceEvents,
    timeout: Duration,
}

impl<'a> Iterator for TimeoutIterator<'a> {
    type Item = DeviceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceKind;

    fn events() -> (mpsc::Sender<DeviceEvent>, DeviceEvents) {
        let (tx, rx) = mpsc::channel();
        (tx, DeviceEvents::new(Arc::new(Mutex::new(rx))))
    }

    #[test]
    fn test_try_recv_empty() {
        let (_tx, events) = events();
        assert!(events.try_recv().is_none());
    }

    #[test]
    fn test_recv_timeout_empty() {
        let (_tx, events) = events();
        let start = std::time::Instant::now();
        assert!(events.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_try_iter_drains_in_order() {
        let (tx, events) = events();
        tx.send(DeviceEvent::OpenFeedback("first".into())).unwrap();
        tx.send(DeviceEvent::Disconnected(DeviceKind::Usb)).unwrap();

        let drained: Vec<_> = events.try_iter().collect();
        assert_eq!(drained.len(), 2);
        assert!(matches!(&drained[0], DeviceEvent::OpenFeedback(m) if m == "first"));
        assert!(drained[1].is_connection_change());
    }

    #[test]
    fn test_clones_share_receiver() {
        let (tx, events) = events();
        let other = events.clone();
        tx.send(DeviceEvent::OpenFeedback("once".into())).unwrap();

        assert!(other.try_recv().is_some());
        assert!(events.try_recv().is_none());
    }

    #[test]
    fn test_recv_after_sender_dropped() {
        let (tx, events) = events();
        drop(tx);
        assert!(events.recv().is_none());
    }
}
