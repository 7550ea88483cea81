//! Stepper motion model
//!
//! Tracks where the controller believes the rotor is and turns angle and step
//! requests into protocol commands.
//!
//! Position lives in two signed counters:
//!
//! - `current_step_count`: the sum of every step delta ever emitted
//! - `calibration_offset_steps`: a correction so angle 0 can be redefined
//!   without touching the counter
//!
//! The reported angle is always derived from both counters and the current
//! `steps_per_revolution × microstepping` scale. It is never cached, so a
//! geometry change reinterprets the same raw count under the new scale.
//!
//! Nothing waits on the device. A move returns as soon as its `STEP` command
//! has been handed to the [`CommandChannel`].
//!
//! # Example
//!
//! ```
//! use drivester::channel::CommandChannel;
//! use drivester::motion::MotionModel;
//!
//! let mut motor = MotionModel::new(CommandChannel::detached());
//! motor.move_to_angle(90.0)?;
//! assert_eq!(motor.state().current_step_count, 50);
//! assert!((motor.get_angle_degrees() - 90.0).abs() < 1e-9);
//! # Ok::<(), drivester::error::DriveError>(())
//! ```

use crate::channel::CommandChannel;
use crate::command::{Command, Direction, SpeedUnit};
use crate::config::MotorSettings;
use crate::error::{AppResult, DriveError};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Microstepping multipliers common driver chips support.
pub const STANDARD_MICROSTEPPING: [u32; 5] = [1, 2, 4, 8, 16];

/// Human label for a standard microstepping multiplier.
pub fn microstepping_label(multiplier: u32) -> Option<&'static str> {
    match multiplier {
        1 => Some("Full Step (x1)"),
        2 => Some("Half Step (x2)"),
        4 => Some("Quarter Step (x4)"),
        8 => Some("Eighth Step (x8)"),
        16 => Some("Sixteenth Step (x16)"),
        _ => None,
    }
}

/// Motor geometry and pass-through set-points.
///
/// Geometry values are always non-zero; the setters on [`MotionModel`] reject
/// zero before it can reach the angle math.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorConfig {
    steps_per_revolution: u32,
    microstepping: u32,
    acceleration: f64,
    deceleration: f64,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            steps_per_revolution: 200,
            microstepping: 1,
            acceleration: 50.0,
            deceleration: 50.0,
        }
    }
}

impl MotorConfig {
    /// Geometry with default acceleration and deceleration.
    pub fn new(steps_per_revolution: u32, microstepping: u32) -> AppResult<Self> {
        ensure_positive_count("steps_per_revolution", steps_per_revolution)?;
        ensure_positive_count("microstepping", microstepping)?;
        Ok(Self {
            steps_per_revolution,
            microstepping,
            ..Self::default()
        })
    }

    /// Build from the `[motor]` configuration section.
    pub fn from_settings(settings: &MotorSettings) -> AppResult<Self> {
        ensure_positive_rate("acceleration", settings.acceleration)?;
        ensure_positive_rate("deceleration", settings.deceleration)?;
        Ok(Self {
            acceleration: settings.acceleration,
            deceleration: settings.deceleration,
            ..Self::new(settings.steps_per_revolution, settings.microstepping)?
        })
    }

    /// Full steps per mechanical revolution.
    pub fn steps_per_revolution(&self) -> u32 {
        self.steps_per_revolution
    }

    /// Microstepping multiplier.
    pub fn microstepping(&self) -> u32 {
        self.microstepping
    }

    /// Acceleration set-point, RPM/s.
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Deceleration set-point, RPM/s.
    pub fn deceleration(&self) -> f64 {
        self.deceleration
    }

    /// `steps_per_revolution × microstepping`, the angular resolution
    /// denominator. Never zero; `u32 × u32` always fits in `u64`.
    pub fn effective_steps(&self) -> u64 {
        u64::from(self.steps_per_revolution) * u64::from(self.microstepping)
    }
}

/// Simulated position and run flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionState {
    /// Motor commanded to spin continuously.
    pub running: bool,
    /// Sum of every step delta emitted.
    pub current_step_count: i64,
    /// Correction added to the counter when reporting angle.
    pub calibration_offset_steps: i64,
}

/// What the single "go" action does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DriveMode {
    /// Toggle continuous rotation.
    #[default]
    Spin,
    /// Emit a fixed relative step move.
    Step(i64),
}

/// Common motors and their full-step counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorPreset {
    /// NEMA 17 hybrid stepper, 1.8° per step.
    Nema17,
    /// NEMA 23 hybrid stepper, 1.8° per step.
    Nema23,
    /// 28BYJ-48 geared unipolar stepper.
    Byj48,
}

impl MotorPreset {
    /// All presets, in display order.
    pub const ALL: [MotorPreset; 3] = [MotorPreset::Nema17, MotorPreset::Nema23, MotorPreset::Byj48];

    /// Full steps per output revolution.
    pub fn steps_per_revolution(self) -> u32 {
        match self {
            MotorPreset::Nema17 | MotorPreset::Nema23 => 200,
            MotorPreset::Byj48 => 2048,
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            MotorPreset::Nema17 => "NEMA17",
            MotorPreset::Nema23 => "NEMA23",
            MotorPreset::Byj48 => "28BYJ-48",
        }
    }
}

impl fmt::Display for MotorPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MotorPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MotorPreset::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "Unknown motor '{}'. Must be one of: nema17, nema23, 28byj-48",
                    s
                )
            })
    }
}

/// The position/command model for one stepper.
///
/// Owns [`MotorConfig`] and [`MotionState`]; shares the [`CommandChannel`]
/// with whoever created it. Every method takes effect synchronously. Callers
/// driving one model from several threads must serialise access themselves.
#[derive(Debug)]
pub struct MotionModel {
    config: MotorConfig,
    state: MotionState,
    channel: CommandChannel,
}

impl MotionModel {
    /// Default geometry (200 steps/rev, full step), stopped at zero.
    pub fn new(channel: CommandChannel) -> Self {
        Self::with_config(channel, MotorConfig::default())
    }

    /// Explicit geometry, stopped at zero. Sends nothing.
    pub fn with_config(channel: CommandChannel, config: MotorConfig) -> Self {
        Self {
            config,
            state: MotionState::default(),
            channel,
        }
    }

    /// Build from the `[motor]` section and push the startup settings.
    ///
    /// Sends `SET_SPEED <default_speed_rpm> RPM`, then `SET_MICROSTEPPING`
    /// when the configured multiplier is not full step.
    pub fn from_settings(channel: CommandChannel, settings: &MotorSettings) -> AppResult<Self> {
        let config = MotorConfig::from_settings(settings)?;
        let mut model = Self::with_config(channel, config);

        model.set_speed(settings.default_speed_rpm, SpeedUnit::Rpm)?;
        if config.microstepping != 1 {
            model.emit(Command::SetMicrostepping(config.microstepping))?;
        }

        info!(
            steps_per_revolution = config.steps_per_revolution,
            microstepping = config.microstepping,
            "Motion model ready"
        );
        Ok(model)
    }

    fn emit(&self, command: Command) -> AppResult<()> {
        self.channel.send_command(&command)?;
        Ok(())
    }

    /// Current motor configuration.
    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    /// Current position and run flag.
    pub fn state(&self) -> &MotionState {
        &self.state
    }

    /// The channel this model writes to.
    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    /// Whether the motor is commanded to spin.
    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// `steps_per_revolution × microstepping`.
    pub fn effective_steps(&self) -> u64 {
        self.config.effective_steps()
    }

    /// `current_step_count + calibration_offset_steps`, saturating.
    pub fn absolute_steps(&self) -> i64 {
        self.state
            .current_step_count
            .saturating_add(self.state.calibration_offset_steps)
    }

    // ---------------------------------------------------------------------
    // Run control
    // ---------------------------------------------------------------------

    /// Begin continuous rotation.
    pub fn start(&mut self) -> AppResult<()> {
        self.emit(Command::Start)?;
        self.state.running = true;
        Ok(())
    }

    /// End continuous rotation.
    pub fn stop(&mut self) -> AppResult<()> {
        self.emit(Command::Stop)?;
        self.state.running = false;
        Ok(())
    }

    /// Stop if running, start otherwise.
    pub fn toggle(&mut self) -> AppResult<()> {
        if self.state.running {
            self.stop()
        } else {
            self.start()
        }
    }

    /// Spin mode toggles the motor; step mode emits its step count.
    pub fn execute(&mut self, mode: DriveMode) -> AppResult<()> {
        match mode {
            DriveMode::Spin => self.toggle(),
            DriveMode::Step(steps) => self.step(steps),
        }
    }

    /// Set spin speed. Position and run flag are untouched.
    pub fn set_speed(&mut self, value: f64, unit: SpeedUnit) -> AppResult<()> {
        if !value.is_finite() {
            return Err(DriveError::InvalidArgument(format!(
                "speed must be finite, got {}",
                value
            )));
        }
        if !unit.is_token() {
            return Err(DriveError::InvalidArgument(format!(
                "speed unit must be a single token, got '{}'",
                unit.to_string().escape_default()
            )));
        }
        self.emit(Command::SetSpeed { value, unit })
    }

    /// Set spin direction. The step counter is not affected.
    pub fn set_direction(&mut self, direction: Direction) -> AppResult<()> {
        self.emit(Command::SetDirection(direction))
    }

    /// Set the driver's current decay.
    pub fn set_decay(&mut self, value: u32) -> AppResult<()> {
        self.emit(Command::Decay(value))
    }

    /// Sound a note on the coils.
    pub fn play_note(&mut self, frequency: f64, duration_ms: u32) -> AppResult<()> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(DriveError::InvalidArgument(format!(
                "note frequency must be a positive number, got {}",
                frequency
            )));
        }
        self.emit(Command::PlayNote {
            frequency,
            duration_ms,
        })
    }

    // ---------------------------------------------------------------------
    // Position
    // ---------------------------------------------------------------------

    /// Emit `STEP <steps>` and add `steps` to the counter.
    ///
    /// Every move goes through here, so the counter always equals the sum of
    /// emitted deltas. A delta that would overflow the counter is rejected
    /// before anything is sent.
    pub fn step(&mut self, steps: i64) -> AppResult<()> {
        let current = self.state.current_step_count;
        let next = current
            .checked_add(steps)
            .ok_or(DriveError::PositionOverflow {
                current,
                delta: steps,
            })?;

        self.emit(Command::Step(steps))?;
        self.state.current_step_count = next;
        debug!(steps, position = next, "Step issued");
        Ok(())
    }

    /// Move to an absolute angle under the current calibration.
    ///
    /// Returns the step delta that was emitted (possibly zero).
    pub fn move_to_angle(&mut self, angle_degrees: f64) -> AppResult<i64> {
        let desired = self.angle_to_steps(angle_degrees)?;
        let absolute = i128::from(self.state.current_step_count)
            + i128::from(self.state.calibration_offset_steps);
        let delta = i64::try_from(i128::from(desired) - absolute).map_err(|_| {
            DriveError::PositionOverflow {
                current: self.state.current_step_count,
                delta: desired,
            }
        })?;

        self.step(delta)?;
        Ok(delta)
    }

    /// Step by an angle, ignoring current position and calibration.
    ///
    /// Returns the step delta that was emitted.
    pub fn move_relative(&mut self, angle_degrees: f64) -> AppResult<i64> {
        let steps = self.angle_to_steps(angle_degrees)?;
        self.step(steps)?;
        Ok(steps)
    }

    /// Reported angle in `[0, 360)`.
    pub fn get_angle_degrees(&self) -> f64 {
        let effective = i128::from(self.effective_steps());
        let absolute = i128::from(self.state.current_step_count)
            + i128::from(self.state.calibration_offset_steps);
        let within_revolution = absolute.rem_euclid(effective);

        let angle = within_revolution as f64 / effective as f64 * 360.0;
        // Past 2^53 steps the last step of a revolution rounds to 360.0
        angle.min(largest_angle_below_full_turn())
    }

    /// `round(angle / 360 × effective_steps)`, ties to even.
    fn angle_to_steps(&self, angle_degrees: f64) -> AppResult<i64> {
        if !angle_degrees.is_finite() {
            return Err(DriveError::InvalidArgument(format!(
                "angle must be finite, got {}",
                angle_degrees
            )));
        }

        let steps = (angle_degrees / 360.0 * self.effective_steps() as f64).round_ties_even();
        if steps.abs() >= i64::MAX as f64 {
            return Err(DriveError::InvalidArgument(format!(
                "angle {}° is too large to express in steps",
                angle_degrees
            )));
        }
        Ok(steps as i64)
    }

    /// Make the current position read as 0°.
    ///
    /// Only the offset changes; the raw counter keeps its value.
    pub fn calibrate_zero(&mut self) -> AppResult<()> {
        let current = self.state.current_step_count;
        let offset = current
            .checked_neg()
            .ok_or(DriveError::PositionOverflow { current, delta: 0 })?;

        self.emit(Command::CalibrateZero)?;
        self.state.calibration_offset_steps = offset;
        info!(offset, "Calibrated zero");
        Ok(())
    }

    /// Home the motor. Both counter and offset return to zero.
    pub fn home(&mut self) -> AppResult<()> {
        self.emit(Command::Home)?;
        self.state.current_step_count = 0;
        self.state.calibration_offset_steps = 0;
        info!("Homed");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    /// Change full steps per revolution. Counters are not rescaled and no
    /// command is sent; the protocol has no such setting.
    pub fn set_steps_per_revolution(&mut self, steps: u32) -> AppResult<()> {
        ensure_positive_count("steps_per_revolution", steps)?;
        self.config.steps_per_revolution = steps;
        debug!(steps, "Steps per revolution updated");
        Ok(())
    }

    /// Apply a preset's steps per revolution.
    pub fn apply_preset(&mut self, preset: MotorPreset) -> AppResult<()> {
        self.set_steps_per_revolution(preset.steps_per_revolution())
    }

    /// Change the microstepping multiplier and tell the driver. Counters are
    /// not rescaled.
    pub fn set_microstepping(&mut self, multiplier: u32) -> AppResult<()> {
        ensure_positive_count("microstepping", multiplier)?;
        self.config.microstepping = multiplier;
        self.emit(Command::SetMicrostepping(multiplier))
    }

    /// Store and transmit the acceleration set-point.
    pub fn set_acceleration(&mut self, rpm_per_s: f64) -> AppResult<()> {
        ensure_positive_rate("acceleration", rpm_per_s)?;
        self.config.acceleration = rpm_per_s;
        self.emit(Command::SetAcceleration(rpm_per_s))
    }

    /// Store and transmit the deceleration set-point.
    pub fn set_deceleration(&mut self, rpm_per_s: f64) -> AppResult<()> {
        ensure_positive_rate("deceleration", rpm_per_s)?;
        self.config.deceleration = rpm_per_s;
        self.emit(Command::SetDeceleration(rpm_per_s))
    }
}

fn largest_angle_below_full_turn() -> f64 {
    f64::from_bits(360.0_f64.to_bits() - 1)
}

fn ensure_positive_count(name: &str, value: u32) -> AppResult<()> {
    if value == 0 {
        return Err(DriveError::Configuration(format!(
            "{} must be greater than 0",
            name
        )));
    }
    Ok(())
}

fn ensure_positive_rate(name: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(DriveError::Configuration(format!(
            "{} must be a positive number, got {}",
            name, value
        )));
    }
    Ok(())
}
