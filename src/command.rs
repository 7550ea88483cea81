//! Outbound command protocol.
//!
//! Every command renders to one line of ASCII text. The device never answers,
//! so there is no response type here.
//!
//! | Command | Arguments | Trigger |
//! |---|---|---|
//! | `START` | | start / toggle to run |
//! | `STOP` | | stop / toggle to stop |
//! | `SET_SPEED` | value, unit | set_speed |
//! | `SET_DIRECTION` | `CW` or `CCW` | set_direction |
//! | `STEP` | signed step count | step and every move |
//! | `DECAY` | value | set_decay |
//! | `PLAY_NOTE` | frequency Hz, duration ms | play_note |
//! | `SET_ACCELERATION` | RPM/s | set_acceleration |
//! | `SET_DECELERATION` | RPM/s | set_deceleration |
//! | `HOME` | | home |
//! | `CALIBRATE_ZERO` | | calibrate_zero |
//! | `SET_MICROSTEPPING` | multiplier | set_microstepping |

use std::fmt;
use std::str::FromStr;

/// Rotation direction for continuous spin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `CW`
    Clockwise,
    /// `CCW`
    CounterClockwise,
}

impl Direction {
    /// Protocol token.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Clockwise => "CW",
            Direction::CounterClockwise => "CCW",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cw" | "clockwise" => Ok(Direction::Clockwise),
            "ccw" | "counter-clockwise" | "counterclockwise" => {
                Ok(Direction::CounterClockwise)
            }
            other => Err(format!(
                "Invalid direction '{}'. Must be one of: cw, ccw",
                other
            )),
        }
    }
}

/// Unit attached to a speed command. The device interprets it; the core only
/// carries it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SpeedUnit {
    /// Revolutions per minute, the default
    #[default]
    Rpm,
    /// Steps per second
    StepsPerSecond,
    /// Anything else the firmware understands, passed through verbatim
    Other(String),
}

impl SpeedUnit {
    /// Whether the unit renders as a single non-empty token.
    pub fn is_token(&self) -> bool {
        match self {
            SpeedUnit::Other(unit) => is_token(unit),
            _ => true,
        }
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

impl fmt::Display for SpeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedUnit::Rpm => f.write_str("RPM"),
            SpeedUnit::StepsPerSecond => f.write_str("SPS"),
            SpeedUnit::Other(unit) => f.write_str(unit),
        }
    }
}

impl FromStr for SpeedUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_token(s) {
            return Err(format!("Invalid speed unit '{}'", s.escape_default()));
        }
        Ok(match s.to_ascii_uppercase().as_str() {
            "RPM" => SpeedUnit::Rpm,
            "SPS" => SpeedUnit::StepsPerSecond,
            _ => SpeedUnit::Other(s.to_string()),
        })
    }
}

/// A single instruction for the driver board.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Begin continuous rotation.
    Start,
    /// End continuous rotation.
    Stop,
    /// Spin speed with its unit.
    SetSpeed {
        /// Magnitude
        value: f64,
        /// Unit token
        unit: SpeedUnit,
    },
    /// Spin direction.
    SetDirection(Direction),
    /// Relative step move; may be negative.
    Step(i64),
    /// Current decay setting.
    Decay(u32),
    /// Drive the coils at an audible frequency.
    PlayNote {
        /// Hz
        frequency: f64,
        /// Milliseconds
        duration_ms: u32,
    },
    /// Acceleration set-point in RPM/s.
    SetAcceleration(f64),
    /// Deceleration set-point in RPM/s.
    SetDeceleration(f64),
    /// Return to the mechanical home.
    Home,
    /// Treat the current position as zero.
    CalibrateZero,
    /// Microstepping multiplier.
    SetMicrostepping(u32),
}

impl Command {
    /// Protocol keyword, without arguments.
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Start => "START",
            Command::Stop => "STOP",
            Command::SetSpeed { .. } => "SET_SPEED",
            Command::SetDirection(_) => "SET_DIRECTION",
            Command::Step(_) => "STEP",
            Command::Decay(_) => "DECAY",
            Command::PlayNote { .. } => "PLAY_NOTE",
            Command::SetAcceleration(_) => "SET_ACCELERATION",
            Command::SetDeceleration(_) => "SET_DECELERATION",
            Command::Home => "HOME",
            Command::CalibrateZero => "CALIBRATE_ZERO",
            Command::SetMicrostepping(_) => "SET_MICROSTEPPING",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = self.keyword();
        match self {
            Command::Start | Command::Stop | Command::Home | Command::CalibrateZero => {
                f.write_str(keyword)
            }
            Command::SetSpeed { value, unit } => write!(f, "{} {} {}", keyword, value, unit),
            Command::SetDirection(direction) => write!(f, "{} {}", keyword, direction),
            Command::Step(steps) => write!(f, "{} {}", keyword, steps),
            Command::Decay(value) => write!(f, "{} {}", keyword, value),
            Command::PlayNote {
                frequency,
                duration_ms,
            } => write!(f, "{} {} {}", keyword, frequency, duration_ms),
            Command::SetAcceleration(value) | Command::SetDeceleration(value) => {
                write!(f, "{} {}", keyword, value)
            }
            Command::SetMicrostepping(multiplier) => write!(f, "{} {}", keyword, multiplier),
        }
    }
}
