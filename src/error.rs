//! Custom error types for the motion core.
//!
//! This module defines the primary error type, `DriveError`, for the whole crate.
//! Using the `thiserror` crate, it gives one place to describe everything that can
//! go wrong between the caller and the command channel.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically TOML syntax problems or
//!   environment overrides that fail to deserialize.
//! - **`Configuration`**: Semantic errors in motor or application settings, such as a
//!   zero steps-per-revolution that would make the angle computation divide by zero.
//!   These are rejected before they touch the model.
//! - **`InvalidArgument`**: A per-call argument the model cannot act on (for example a
//!   non-finite target angle).
//! - **`Channel`**: A command the channel refused to frame. Transport failures are never
//!   reported here; the channel soft-fails those to the log.
//! - **`PositionOverflow`**: A step delta that would overflow the signed step counter.
//!
//! Device-side errors do not exist at this layer: the protocol is one-way.

use crate::channel::ChannelError;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DriveError>;

/// Errors surfaced by the motion core.
#[derive(Error, Debug)]
pub enum DriveError {
    /// Configuration source could not be read or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration parsed but holds a value the model cannot use.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// An operation argument was rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The command channel refused the command.
    #[error("Command channel error: {0}")]
    Channel(#[from] ChannelError),

    /// I/O failure outside the soft-fail transport path (script files, stdin).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Applying the step delta would overflow the step counter.
    #[error("Step counter overflow: {current} + {delta}")]
    PositionOverflow {
        /// Counter value before the rejected step.
        current: i64,
        /// Rejected delta.
        delta: i64,
    },
}

impl DriveError {
    /// Whether the caller can keep using the model after this error.
    ///
    /// Broken configuration sources and I/O failures on script input are not;
    /// the model itself is never left in a partial state.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DriveError::Config(_) | DriveError::Io(_))
    }
}
