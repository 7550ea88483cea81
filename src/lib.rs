//! # Drivester Core Library
//!
//! Host-side motion core for a serial-attached stepper driver. The library
//! turns operator intents (spin, step, move to an angle, play a note) into a
//! one-way stream of single-line text commands, and keeps an open-loop model
//! of where the rotor should be.
//!
//! ## Crate Structure
//!
//! - **`adapters`**: Byte-level transports behind the `CommandSink` trait: a
//!   serial port adapter and a recording mock.
//! - **`channel`**: The soft-fail `CommandChannel`. Without a device every
//!   command is logged and treated as sent.
//! - **`command`**: The outbound protocol vocabulary (`Command`, `Direction`,
//!   `SpeedUnit`) and its line rendering.
//! - **`config`**: Figment-based layered configuration (defaults, TOML file,
//!   `DRIVESTER_` environment variables).
//! - **`console`**: Line-oriented command language driving a `Session`, used
//!   by the interactive console and script runner.
//! - **`error`**: The crate-wide `DriveError` enum and `AppResult` alias.
//! - **`motion`**: `MotionModel`, the step counter, calibration offset, and
//!   angle mapping.
//! - **`notes`**: Note keyboard mapping and semitone frequency math.
//! - **`telemetry`**: `tracing-subscriber` setup.

pub mod adapters;
pub mod channel;
pub mod command;
pub mod config;
pub mod console;
pub mod error;
pub mod motion;
pub mod notes;
pub mod telemetry;

pub use channel::CommandChannel;
pub use command::{Command, Direction, SpeedUnit};
pub use error::{AppResult, DriveError};
pub use motion::{DriveMode, MotionModel, MotorConfig, MotorPreset};
