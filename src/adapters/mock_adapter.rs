//! Mock transport for testing
//!
//! This adapter implements [`CommandSink`] without any hardware. It provides:
//! - A command log shared with a [`MockHandle`] for test verification
//! - Controllable one-shot failure injection
//! - Simulated unplugging

use super::{AdapterError, CommandSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Mock transport for testing
///
/// # Example
///
/// ```
/// use drivester::adapters::{CommandSink, MockAdapter};
///
/// let mut adapter = MockAdapter::new();
/// let handle = adapter.handle();
/// adapter.send_line("START").unwrap();
/// assert_eq!(handle.commands(), vec!["START".to_string()]);
/// ```
pub struct MockAdapter {
    connected: Arc<AtomicBool>,
    should_fail_next: Arc<AtomicBool>,
    call_log: Arc<Mutex<Vec<String>>>,
}

/// Observer side of a [`MockAdapter`], kept by tests after the adapter has
/// been moved into a channel.
#[derive(Clone)]
pub struct MockHandle {
    connected: Arc<AtomicBool>,
    should_fail_next: Arc<AtomicBool>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockAdapter {
    /// Create a connected mock adapter with an empty log
    pub fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
            should_fail_next: Arc::new(AtomicBool::new(false)),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock adapter whose device is unplugged
    pub fn disconnected() -> Self {
        let adapter = Self::new();
        adapter.connected.store(false, Ordering::SeqCst);
        adapter
    }

    /// Get an observer handle sharing this adapter's log and failure flag
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            connected: Arc::clone(&self.connected),
            should_fail_next: Arc::clone(&self.should_fail_next),
            call_log: Arc::clone(&self.call_log),
        }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Get a copy of every command line written so far
    pub fn commands(&self) -> Vec<String> {
        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of command lines written so far
    pub fn len(&self) -> usize {
        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the command log
    pub fn clear(&self) {
        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Trigger a failure on the next write
    pub fn trigger_failure(&self) {
        self.should_fail_next.store(true, Ordering::SeqCst);
    }

    /// Whether the mock device is still attached
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl CommandSink for MockAdapter {
    fn send_line(&mut self, line: &str) -> Result<(), AdapterError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AdapterError::NotConnected);
        }
        if self.should_fail_next.swap(false, Ordering::SeqCst) {
            return Err(AdapterError::SendFailed("Mock write failure".to_string()));
        }

        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), AdapterError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("MockAdapter disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn adapter_type(&self) -> &str {
        "mock"
    }

    fn info(&self) -> String {
        format!("MockAdapter ({} commands logged)", self.handle().len())
    }
}
