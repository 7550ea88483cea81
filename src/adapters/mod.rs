// src/adapters/mod.rs

//! Transports that carry command lines to a stepper driver board.
//!
//! A [`CommandSink`] only knows how to push one line out and how to let go of
//! the underlying device. Soft-fail policy lives one level up in
//! [`crate::channel::CommandChannel`], so sinks report every failure honestly.

use thiserror::Error;

pub mod serial_adapter;
pub use serial_adapter::SerialAdapter;

pub mod mock_adapter;
pub use mock_adapter::{MockAdapter, MockHandle};

/// An error that can occur when pushing bytes through a transport.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The transport has no open device.
    #[error("Not connected")]
    NotConnected,

    /// Opening the device failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Writing a command failed.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Built without the transport's feature flag.
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    FeatureDisabled,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One-way, line-oriented transport.
pub trait CommandSink: Send {
    /// Write `line` followed by the sink's terminator. No response is read.
    fn send_line(&mut self, line: &str) -> Result<(), AdapterError>;

    /// Release the device. Must be safe to call repeatedly.
    fn close(&mut self) -> Result<(), AdapterError>;

    /// Whether a device is currently attached.
    fn is_connected(&self) -> bool;

    /// Short transport kind, e.g. `"serial"`.
    fn adapter_type(&self) -> &str;

    /// Human-readable description for logs.
    fn info(&self) -> String;
}
