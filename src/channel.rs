//! Soft-fail command channel.
//!
//! [`CommandChannel`] wraps an optional [`CommandSink`]. With a live device the
//! command is written as one line; with no device (never configured, failed
//! to open, closed, or unplugged) the attempt is logged and reported as a
//! success. The motion model therefore never has to branch on transport state.
//!
//! The only errors returned are framing errors: a command that is empty or
//! carries its own line break would desynchronise the device's line parser.
//!
//! # Example
//!
//! ```
//! use drivester::channel::CommandChannel;
//!
//! let channel = CommandChannel::detached();
//! channel.send("START").unwrap(); // logged as a mock command
//! assert_eq!(channel.stats().mocked, 1);
//! channel.close();
//! channel.close(); // idempotent
//! ```

use crate::adapters::{CommandSink, SerialAdapter};
use crate::command::Command;
use crate::config::SerialConfig;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Commands the channel refuses to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Nothing to send.
    #[error("Command is empty")]
    Empty,

    /// The command would be split into several lines on the device side.
    #[error("Command contains a line break: '{0}'")]
    EmbeddedLineBreak(String),
}

/// Running totals since the channel was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Written to an attached transport.
    pub delivered: u64,
    /// Logged because no transport was attached.
    pub mocked: u64,
    /// Attempted on an attached transport but the write failed.
    pub failed: u64,
}

impl ChannelStats {
    /// Every command the channel accepted, regardless of outcome.
    pub fn total(&self) -> u64 {
        self.delivered + self.mocked + self.failed
    }
}

struct ChannelInner {
    sink: Option<Box<dyn CommandSink>>,
    stats: ChannelStats,
}

impl ChannelInner {
    fn release(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let description = sink.info();
            match sink.close() {
                Ok(()) => info!(
                    transport = sink.adapter_type(),
                    "Command channel closed: {}", description
                ),
                Err(e) => warn!(error = %e, "Error while closing {}", description),
            }
        }
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        self.release();
    }
}

/// Shared handle to the outbound command stream.
///
/// Cloning is cheap; all clones talk to the same transport. The embedding
/// application typically keeps one clone to manage the port while the motion
/// model holds another.
#[derive(Clone)]
pub struct CommandChannel {
    inner: Arc<Mutex<ChannelInner>>,
}

impl CommandChannel {
    /// Channel with no transport: every command is logged only.
    pub fn detached() -> Self {
        Self::from_parts(None)
    }

    /// Channel writing to `sink`.
    pub fn with_sink<S: CommandSink + 'static>(sink: S) -> Self {
        Self::from_parts(Some(Box::new(sink)))
    }

    /// Open the serial port named in `config`.
    ///
    /// A missing port setting or a failed open degrades to a detached channel
    /// with a warning; the caller always gets a usable channel back.
    pub fn open_serial(config: &SerialConfig) -> Self {
        let Some(mut adapter) = SerialAdapter::from_config(config) else {
            info!("No serial port configured; commands will be mocked");
            return Self::detached();
        };

        match adapter.connect() {
            Ok(()) => {
                info!("Command channel attached: {}", adapter.info());
                Self::with_sink(adapter)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    port = adapter.port_name(),
                    "Failed to open serial port; commands will be mocked"
                );
                Self::detached()
            }
        }
    }

    fn from_parts(sink: Option<Box<dyn CommandSink>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChannelInner {
                sink,
                stats: ChannelStats::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send one command line.
    ///
    /// Transport problems are logged and swallowed. Only framing problems
    /// return an error, and in that case nothing is written or counted.
    pub fn send(&self, command: &str) -> Result<(), ChannelError> {
        if command.is_empty() {
            return Err(ChannelError::Empty);
        }
        if command.contains(['\n', '\r']) {
            return Err(ChannelError::EmbeddedLineBreak(
                command.escape_default().to_string(),
            ));
        }

        let mut inner = self.lock();
        let ChannelInner { sink, stats } = &mut *inner;

        match sink.as_mut().filter(|s| s.is_connected()) {
            Some(sink) => match sink.send_line(command) {
                Ok(()) => {
                    stats.delivered += 1;
                    debug!(command, "Command sent");
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(error = %e, command, "Command write failed; continuing without device");
                }
            },
            None => {
                stats.mocked += 1;
                info!("[mock] Command sent: {}", command);
            }
        }
        Ok(())
    }

    /// Send a typed protocol command.
    pub fn send_command(&self, command: &Command) -> Result<(), ChannelError> {
        self.send(&command.to_string())
    }

    /// Replace the transport, closing any previous one.
    pub fn attach<S: CommandSink + 'static>(&self, sink: S) {
        let mut inner = self.lock();
        inner.release();
        info!("Command channel attached: {}", sink.info());
        inner.sink = Some(Box::new(sink));
    }

    /// Release the transport. Safe to call when already closed or never opened.
    pub fn close(&self) {
        self.lock().release();
    }

    /// Whether commands currently reach a device.
    pub fn is_connected(&self) -> bool {
        self.lock().sink.as_ref().is_some_and(|s| s.is_connected())
    }

    /// Description of the transport, or of mock mode.
    pub fn info(&self) -> String {
        match &self.lock().sink {
            Some(sink) if sink.is_connected() => sink.info(),
            Some(sink) => format!("{} (disconnected, mock mode)", sink.info()),
            None => "mock mode (no transport)".to_string(),
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> ChannelStats {
        self.lock().stats
    }
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::detached()
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("transport", &self.info())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn detached_channel_logs_and_succeeds() {
        let channel = CommandChannel::detached();
        assert!(channel.send("START").is_ok());
        assert!(!channel.is_connected());
        assert_eq!(channel.stats().mocked, 1);
        assert!(logs_contain("[mock] Command sent: START"));
    }

    #[test]
    fn attached_channel_writes_lines() {
        let adapter = MockAdapter::new();
        let handle = adapter.handle();
        let channel = CommandChannel::with_sink(adapter);

        channel.send("START").unwrap();
        channel.send_command(&Command::Step(-3)).unwrap();

        assert_eq!(handle.commands(), vec!["START", "STEP -3"]);
        assert_eq!(channel.stats().delivered, 2);
        assert!(channel.is_connected());
    }

    #[test]
    #[traced_test]
    fn write_failure_is_swallowed() {
        let adapter = MockAdapter::new();
        let handle = adapter.handle();
        let channel = CommandChannel::with_sink(adapter);

        handle.trigger_failure();
        assert!(channel.send("HOME").is_ok());

        let stats = channel.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delivered, 0);
        assert!(logs_contain("Command write failed"));
    }

    #[test]
    fn unplugged_sink_falls_back_to_mock() {
        let channel = CommandChannel::with_sink(MockAdapter::disconnected());
        channel.send("STOP").unwrap();
        assert_eq!(channel.stats().mocked, 1);
        assert!(channel.info().contains("mock mode"));
    }

    #[test]
    fn framing_errors_are_rejected_before_writing() {
        let adapter = MockAdapter::new();
        let handle = adapter.handle();
        let channel = CommandChannel::with_sink(adapter);

        assert_eq!(channel.send(""), Err(ChannelError::Empty));
        assert!(matches!(
            channel.send("STEP 1\nHOME"),
            Err(ChannelError::EmbeddedLineBreak(_))
        ));
        assert!(handle.is_empty());
        assert_eq!(channel.stats().total(), 0);
    }

    #[test]
    fn close_is_idempotent_and_degrades_to_mock() {
        let adapter = MockAdapter::new();
        let handle = adapter.handle();
        let channel = CommandChannel::with_sink(adapter);

        channel.close();
        channel.close();
        assert!(!handle.is_connected());
        assert!(!channel.is_connected());

        channel.send("START").unwrap();
        assert!(handle.is_empty());
        assert_eq!(channel.stats().mocked, 1);

        CommandChannel::detached().close();
    }

    #[test]
    fn clones_share_transport() {
        let adapter = MockAdapter::new();
        let handle = adapter.handle();
        let channel = CommandChannel::with_sink(adapter);
        let other = channel.clone();

        other.send("DECAY 10").unwrap();
        assert_eq!(channel.stats().delivered, 1);

        channel.close();
        assert!(!other.is_connected());
        assert_eq!(handle.len(), 1);
    }

    #[test]
    fn attach_replaces_previous_sink() {
        let first = MockAdapter::new();
        let first_handle = first.handle();
        let channel = CommandChannel::with_sink(first);

        let second = MockAdapter::new();
        let second_handle = second.handle();
        channel.attach(second);

        channel.send("HOME").unwrap();
        assert!(!first_handle.is_connected());
        assert!(first_handle.is_empty());
        assert_eq!(second_handle.commands(), vec!["HOME"]);
    }

    #[test]
    fn open_serial_without_port_is_detached() {
        let channel = CommandChannel::open_serial(&SerialConfig::default());
        assert!(!channel.is_connected());
    }

    #[test]
    fn open_serial_with_bad_port_is_detached() {
        let config = SerialConfig {
            port: Some("/dev/definitely-not-a-port".to_string()),
            ..SerialConfig::default()
        };
        let channel = CommandChannel::open_serial(&config);
        assert!(!channel.is_connected());
        channel.send("START").unwrap();
        assert_eq!(channel.stats().mocked, 1);
    }
}
