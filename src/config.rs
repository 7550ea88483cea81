//! Configuration System using Figment
//!
//! Configuration is layered from:
//! 1. Built-in defaults (every section is optional)
//! 2. A TOML file (`config/drivester.toml` unless another path is given)
//! 3. Environment variables prefixed with `DRIVESTER_`, with `__` between
//!    nesting levels
//!
//! # Example
//! ```no_run
//! use drivester::config::DrivesterConfig;
//!
//! let config = DrivesterConfig::load()?;
//! config.validate()?;
//! println!("Steps/rev: {}", config.motor.steps_per_revolution);
//! # Ok::<(), drivester::error::DriveError>(())
//! ```
//!
//! Environment override example: `DRIVESTER_SERIAL__PORT=/dev/ttyACM0`.

use crate::error::{AppResult, DriveError};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/drivester.toml";

/// Accepted base frequencies for the note keyboard, in Hz.
pub const BASE_FREQUENCY_RANGE: RangeInclusive<f64> = 50.0..=2000.0;

/// Accepted note durations, in milliseconds.
pub const NOTE_DURATION_RANGE: RangeInclusive<u32> = 50..=2000;

/// Accepted octave shifts.
pub const OCTAVE_SHIFT_RANGE: RangeInclusive<i32> = -4..=4;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivesterConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Serial transport settings
    pub serial: SerialConfig,
    /// Motor geometry and set-points
    pub motor: MotorSettings,
    /// Note keyboard settings
    pub notes: NoteSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Drivester".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Serial transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port path; `None` runs the channel in mock mode
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Write timeout in milliseconds
    pub timeout_ms: u64,
    /// Appended to every command
    pub line_terminator: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            timeout_ms: 1000,
            line_terminator: "\n".to_string(),
        }
    }
}

/// Motor configuration applied at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorSettings {
    /// Full steps per mechanical revolution
    pub steps_per_revolution: u32,
    /// Microstepping multiplier
    pub microstepping: u32,
    /// Acceleration set-point, RPM/s
    pub acceleration: f64,
    /// Deceleration set-point, RPM/s
    pub deceleration: f64,
    /// Speed pushed to the device when the model starts, RPM
    pub default_speed_rpm: f64,
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self {
            steps_per_revolution: 200,
            microstepping: 1,
            acceleration: 50.0,
            deceleration: 50.0,
            default_speed_rpm: 120.0,
        }
    }
}

/// Note keyboard configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteSettings {
    /// Frequency of semitone 0, Hz
    pub base_frequency_hz: f64,
    /// How long each note plays, ms
    pub duration_ms: u32,
    /// Whole-octave transposition
    pub octave_shift: i32,
}

impl Default for NoteSettings {
    fn default() -> Self {
        Self {
            base_frequency_hz: 220.0,
            duration_ms: 500,
            octave_shift: 0,
        }
    }
}

impl DrivesterConfig {
    /// Load configuration from the default path and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DRIVESTER_").split("__"))
            .extract()
            .map_err(DriveError::from)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DriveError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.serial.baud_rate == 0 {
            return Err(DriveError::Configuration(
                "serial.baud_rate must be greater than 0".to_string(),
            ));
        }
        if self.serial.port.as_deref().is_some_and(str::is_empty) {
            return Err(DriveError::Configuration(
                "serial.port cannot be empty; omit it to run in mock mode".to_string(),
            ));
        }
        if !matches!(self.serial.line_terminator.as_str(), "\n" | "\r\n") {
            return Err(DriveError::Configuration(format!(
                "serial.line_terminator must be \"\\n\" or \"\\r\\n\", got {:?}",
                self.serial.line_terminator
            )));
        }

        validate_motor(&self.motor)?;
        validate_notes(&self.notes)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DriveError::Configuration(format!("Failed to render config: {}", e)))
    }
}

fn validate_motor(motor: &MotorSettings) -> AppResult<()> {
    if motor.steps_per_revolution == 0 {
        return Err(DriveError::Configuration(
            "motor.steps_per_revolution must be greater than 0".to_string(),
        ));
    }
    if motor.microstepping == 0 {
        return Err(DriveError::Configuration(
            "motor.microstepping must be greater than 0".to_string(),
        ));
    }
    for (name, value) in [
        ("motor.acceleration", motor.acceleration),
        ("motor.deceleration", motor.deceleration),
        ("motor.default_speed_rpm", motor.default_speed_rpm),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(DriveError::Configuration(format!(
                "{} must be a positive number, got {}",
                name, value
            )));
        }
    }
    Ok(())
}

fn validate_notes(notes: &NoteSettings) -> AppResult<()> {
    if !BASE_FREQUENCY_RANGE.contains(&notes.base_frequency_hz) {
        return Err(DriveError::Configuration(format!(
            "notes.base_frequency_hz {} outside {:?}",
            notes.base_frequency_hz, BASE_FREQUENCY_RANGE
        )));
    }
    if !NOTE_DURATION_RANGE.contains(&notes.duration_ms) {
        return Err(DriveError::Configuration(format!(
            "notes.duration_ms {} outside {:?}",
            notes.duration_ms, NOTE_DURATION_RANGE
        )));
    }
    if !OCTAVE_SHIFT_RANGE.contains(&notes.octave_shift) {
        return Err(DriveError::Configuration(format!(
            "notes.octave_shift {} outside {:?}",
            notes.octave_shift, OCTAVE_SHIFT_RANGE
        )));
    }
    Ok(())
}
