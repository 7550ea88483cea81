//! Line-oriented operator console.
//!
//! Each input line is parsed into a [`ConsoleCommand`] and applied to a
//! [`Session`]. The same loop serves the interactive console and script
//! files: blank lines and `#` comments are skipped, and a bad line is
//! reported without ending the run.
//!
//! ```
//! use drivester::channel::CommandChannel;
//! use drivester::console::{run_lines, Session};
//! use drivester::motion::MotionModel;
//!
//! let mut session = Session::new(MotionModel::new(CommandChannel::detached()));
//! let script = "rel 90\nangle\n";
//! let mut out = Vec::new();
//! let summary = run_lines(&mut session, script.as_bytes(), &mut out).unwrap();
//! assert_eq!(summary.executed, 2);
//! assert!(String::from_utf8(out).unwrap().contains("90.00"));
//! ```

use crate::command::{Direction, SpeedUnit};
use crate::config::NoteSettings;
use crate::error::{AppResult, DriveError};
use crate::motion::{microstepping_label, DriveMode, MotionModel, MotorPreset};
use crate::notes::{KeyOutcome, NotePlayer};
use std::fmt::Write as _;
use std::io::{BufRead, Write};
use std::str::{FromStr, SplitWhitespace};
use tracing::{debug, warn};

/// Step count used by `mode step` before one is given.
pub const DEFAULT_STEP_COUNT: i64 = 1;

const HELP: &str = "\
Run control:   start | stop | toggle | exec | mode spin | mode step [n]
Motion:        step <n> | goto <deg> | rel <deg> | zero | home | angle
Drive:         speed <v> [RPM|SPS|unit] | dir <cw|ccw> | decay <v>
               accel <v> | decel <v> | micro <m>
Geometry:      steps-per-rev <n> | preset <nema17|nema23|28byj-48>
Notes:         note <hz> <ms> | key <letter> | octave <up|down>
Session:       status | reset | help | quit";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `toggle`
    Toggle,
    /// `speed <v> [unit]`
    Speed(f64, SpeedUnit),
    /// `dir <cw|ccw>`
    Direction(Direction),
    /// `step <n>`
    Step(i64),
    /// `decay <v>`
    Decay(u32),
    /// `note <hz> <ms>`
    Note(f64, u32),
    /// `key <letter>`
    Key(char),
    /// `octave <up|down>`
    Octave(i32),
    /// `steps-per-rev <n>`
    StepsPerRevolution(u32),
    /// `preset <name>`
    Preset(MotorPreset),
    /// `micro <m>`
    Microstepping(u32),
    /// `accel <v>`
    Acceleration(f64),
    /// `decel <v>`
    Deceleration(f64),
    /// `zero`
    Zero,
    /// `home`
    Home,
    /// `goto <deg>`
    GoTo(f64),
    /// `rel <deg>`
    Relative(f64),
    /// `angle`
    Angle,
    /// `mode spin` or `mode step [n]`; `None` keeps the previous count
    Mode(ModeRequest),
    /// `exec`
    Execute,
    /// `status`
    Status,
    /// `reset`
    Reset,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

/// Target of a `mode` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeRequest {
    /// Continuous rotation.
    Spin,
    /// Fixed step moves, optionally with a new count.
    Step(Option<i64>),
}

fn parse_error(message: impl Into<String>) -> DriveError {
    DriveError::InvalidArgument(message.into())
}

fn required<'a>(args: &mut SplitWhitespace<'a>, verb: &str, what: &str) -> AppResult<&'a str> {
    args.next()
        .ok_or_else(|| parse_error(format!("'{}' needs {}", verb, what)))
}

fn number<T: FromStr>(token: &str, what: &str) -> AppResult<T> {
    token
        .parse()
        .map_err(|_| parse_error(format!("'{}' is not a valid {}", token, what)))
}

impl FromStr for ConsoleCommand {
    type Err = DriveError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut args = line.split_whitespace();
        let verb = args
            .next()
            .ok_or_else(|| parse_error("empty command"))?
            .to_ascii_lowercase();

        let command = match verb.as_str() {
            "start" => ConsoleCommand::Start,
            "stop" => ConsoleCommand::Stop,
            "toggle" => ConsoleCommand::Toggle,
            "speed" => {
                let value = number(required(&mut args, &verb, "a value")?, "speed")?;
                let unit = match args.next() {
                    Some(unit) => unit.parse().map_err(parse_error)?,
                    None => SpeedUnit::Rpm,
                };
                ConsoleCommand::Speed(value, unit)
            }
            "dir" => ConsoleCommand::Direction(
                required(&mut args, &verb, "cw or ccw")?
                    .parse()
                    .map_err(parse_error)?,
            ),
            "step" => ConsoleCommand::Step(number(
                required(&mut args, &verb, "a step count")?,
                "step count",
            )?),
            "decay" => ConsoleCommand::Decay(number(
                required(&mut args, &verb, "a value")?,
                "decay value",
            )?),
            "note" => {
                let frequency = number(required(&mut args, &verb, "a frequency")?, "frequency")?;
                let duration = number(required(&mut args, &verb, "a duration")?, "duration")?;
                ConsoleCommand::Note(frequency, duration)
            }
            "key" => {
                let token = required(&mut args, &verb, "a letter")?;
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(key), None) => ConsoleCommand::Key(key),
                    _ => return Err(parse_error(format!("'{}' is not a single key", token))),
                }
            }
            "octave" => match required(&mut args, &verb, "up or down")?
                .to_ascii_lowercase()
                .as_str()
            {
                "up" => ConsoleCommand::Octave(1),
                "down" => ConsoleCommand::Octave(-1),
                other => return Err(parse_error(format!("'{}' is not up or down", other))),
            },
            "steps-per-rev" => ConsoleCommand::StepsPerRevolution(number(
                required(&mut args, &verb, "a step count")?,
                "step count",
            )?),
            "preset" => ConsoleCommand::Preset(
                required(&mut args, &verb, "a motor name")?
                    .parse()
                    .map_err(parse_error)?,
            ),
            "micro" => ConsoleCommand::Microstepping(number(
                required(&mut args, &verb, "a multiplier")?,
                "multiplier",
            )?),
            "accel" => ConsoleCommand::Acceleration(number(
                required(&mut args, &verb, "a rate")?,
                "rate",
            )?),
            "decel" => ConsoleCommand::Deceleration(number(
                required(&mut args, &verb, "a rate")?,
                "rate",
            )?),
            "zero" => ConsoleCommand::Zero,
            "home" => ConsoleCommand::Home,
            "goto" => ConsoleCommand::GoTo(number(required(&mut args, &verb, "an angle")?, "angle")?),
            "rel" => {
                ConsoleCommand::Relative(number(required(&mut args, &verb, "an angle")?, "angle")?)
            }
            "angle" => ConsoleCommand::Angle,
            "mode" => match required(&mut args, &verb, "spin or step")?
                .to_ascii_lowercase()
                .as_str()
            {
                "spin" => ConsoleCommand::Mode(ModeRequest::Spin),
                "step" => {
                    let count = args
                        .next()
                        .map(|token| number(token, "step count"))
                        .transpose()?;
                    ConsoleCommand::Mode(ModeRequest::Step(count))
                }
                other => return Err(parse_error(format!("'{}' is not spin or step", other))),
            },
            "exec" => ConsoleCommand::Execute,
            "status" => ConsoleCommand::Status,
            "reset" => ConsoleCommand::Reset,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(parse_error(format!("unknown command '{}'", other))),
        };

        if let Some(extra) = args.next() {
            return Err(parse_error(format!(
                "unexpected argument '{}' after '{}'",
                extra, verb
            )));
        }
        Ok(command)
    }
}

/// What the caller should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to print.
    Done,
    /// Print this text.
    Message(String),
    /// End the session.
    Quit,
}

/// Console state layered over a [`MotionModel`].
///
/// Tracks what the model does not: the drive mode used by `exec`, the last
/// requested speed (re-sent when entering spin mode), and the note keyboard.
#[derive(Debug)]
pub struct Session {
    model: MotionModel,
    mode: DriveMode,
    step_count: i64,
    speed: (f64, SpeedUnit),
    notes: NotePlayer,
    note_defaults: NoteSettings,
}

impl Session {
    /// Session in spin mode with default note settings and a 120 RPM speed.
    pub fn new(model: MotionModel) -> Self {
        Self::with_settings(model, 120.0, NoteSettings::default())
    }

    /// Session with an explicit starting speed (RPM) and note settings.
    pub fn with_settings(model: MotionModel, speed_rpm: f64, notes: NoteSettings) -> Self {
        Self {
            model,
            mode: DriveMode::Spin,
            step_count: DEFAULT_STEP_COUNT,
            speed: (speed_rpm, SpeedUnit::Rpm),
            notes: NotePlayer::new(notes.clone()),
            note_defaults: notes,
        }
    }

    /// The underlying model.
    pub fn model(&self) -> &MotionModel {
        &self.model
    }

    /// Current drive mode.
    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    /// Note keyboard state.
    pub fn notes(&self) -> &NotePlayer {
        &self.notes
    }

    /// Parse and apply one line. Blank lines and comments yield [`Reply::Done`].
    pub fn execute_line(&mut self, line: &str) -> AppResult<Reply> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(Reply::Done);
        }
        let command: ConsoleCommand = line.parse()?;
        self.apply(command)
    }

    /// Apply a parsed command.
    pub fn apply(&mut self, command: ConsoleCommand) -> AppResult<Reply> {
        debug!(?command, "Console command");
        match command {
            ConsoleCommand::Start => self.model.start()?,
            ConsoleCommand::Stop => self.model.stop()?,
            ConsoleCommand::Toggle => self.model.toggle()?,
            ConsoleCommand::Speed(value, unit) => {
                self.model.set_speed(value, unit.clone())?;
                self.speed = (value, unit);
            }
            ConsoleCommand::Direction(direction) => self.model.set_direction(direction)?,
            ConsoleCommand::Step(steps) => self.model.step(steps)?,
            ConsoleCommand::Decay(value) => self.model.set_decay(value)?,
            ConsoleCommand::Note(frequency, duration_ms) => {
                self.model.play_note(frequency, duration_ms)?
            }
            ConsoleCommand::Key(key) => {
                return match self.notes.press_key(&mut self.model, key)? {
                    Some(KeyOutcome::Played(note)) => Ok(Reply::Message(format!(
                        "Note {}: {:.2} Hz, {} ms",
                        note.semitone, note.frequency, note.duration_ms
                    ))),
                    Some(KeyOutcome::Octave(shift)) => {
                        Ok(Reply::Message(format!("Octave shift: {}", shift)))
                    }
                    None => Err(parse_error(format!("key '{}' is not mapped", key))),
                };
            }
            ConsoleCommand::Octave(delta) => {
                let shift = self.notes.shift_octave(delta);
                return Ok(Reply::Message(format!("Octave shift: {}", shift)));
            }
            ConsoleCommand::StepsPerRevolution(steps) => {
                self.model.set_steps_per_revolution(steps)?
            }
            ConsoleCommand::Preset(preset) => {
                self.model.apply_preset(preset)?;
                return Ok(Reply::Message(format!(
                    "{}: {} steps/rev",
                    preset,
                    preset.steps_per_revolution()
                )));
            }
            ConsoleCommand::Microstepping(multiplier) => {
                self.model.set_microstepping(multiplier)?;
                if microstepping_label(multiplier).is_none() {
                    warn!(multiplier, "Non-standard microstepping multiplier");
                }
            }
            ConsoleCommand::Acceleration(rate) => self.model.set_acceleration(rate)?,
            ConsoleCommand::Deceleration(rate) => self.model.set_deceleration(rate)?,
            ConsoleCommand::Zero => self.model.calibrate_zero()?,
            ConsoleCommand::Home => self.model.home()?,
            ConsoleCommand::GoTo(angle) => {
                let delta = self.model.move_to_angle(angle)?;
                return Ok(Reply::Message(format!("Moved {} steps", delta)));
            }
            ConsoleCommand::Relative(angle) => {
                let delta = self.model.move_relative(angle)?;
                return Ok(Reply::Message(format!("Moved {} steps", delta)));
            }
            ConsoleCommand::Angle => {
                return Ok(Reply::Message(format!(
                    "Angle: {:.2}°",
                    self.model.get_angle_degrees()
                )));
            }
            ConsoleCommand::Mode(request) => self.switch_mode(request)?,
            ConsoleCommand::Execute => self.model.execute(self.mode)?,
            ConsoleCommand::Status => return Ok(Reply::Message(self.status())),
            ConsoleCommand::Reset => {
                self.reset()?;
                return Ok(Reply::Message("Session reset".to_string()));
            }
            ConsoleCommand::Help => return Ok(Reply::Message(HELP.to_string())),
            ConsoleCommand::Quit => return Ok(Reply::Quit),
        }
        Ok(Reply::Done)
    }

    fn switch_mode(&mut self, request: ModeRequest) -> AppResult<()> {
        match request {
            ModeRequest::Spin => {
                let (value, unit) = self.speed.clone();
                self.model.set_speed(value, unit)?;
                self.mode = DriveMode::Spin;
            }
            ModeRequest::Step(count) => {
                if let Some(count) = count {
                    self.step_count = count;
                }
                self.model.stop()?;
                self.mode = DriveMode::Step(self.step_count);
            }
        }
        Ok(())
    }

    /// Stop, home, and return to spin mode with the configured note settings.
    pub fn reset(&mut self) -> AppResult<()> {
        self.model.stop()?;
        self.model.home()?;
        self.mode = DriveMode::Spin;
        self.step_count = DEFAULT_STEP_COUNT;
        self.notes = NotePlayer::new(self.note_defaults.clone());
        Ok(())
    }

    /// Multi-line summary of model, mode, and transport.
    pub fn status(&self) -> String {
        let config = self.model.config();
        let state = self.model.state();
        let stats = self.model.channel().stats();
        let micro = microstepping_label(config.microstepping()).unwrap_or("custom");
        let mode = match self.mode {
            DriveMode::Spin => "spin".to_string(),
            DriveMode::Step(n) => format!("step ({} steps)", n),
        };

        let mut out = String::new();
        let _ = writeln!(out, "Running:        {}", state.running);
        let _ = writeln!(out, "Mode:           {}", mode);
        let _ = writeln!(out, "Speed:          {} {}", self.speed.0, self.speed.1);
        let _ = writeln!(
            out,
            "Geometry:       {} steps/rev x{} ({})",
            config.steps_per_revolution(),
            config.microstepping(),
            micro
        );
        let _ = writeln!(out, "Step count:     {}", state.current_step_count);
        let _ = writeln!(out, "Offset:         {}", state.calibration_offset_steps);
        let _ = writeln!(out, "Angle:          {:.2}°", self.model.get_angle_degrees());
        let _ = writeln!(out, "Octave shift:   {}", self.notes.settings().octave_shift);
        let _ = write!(
            out,
            "Transport:      {} ({} sent, {} mocked, {} failed)",
            self.model.channel().info(),
            stats.delivered,
            stats.mocked,
            stats.failed
        );
        out
    }
}

/// Totals from [`run_lines`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Commands applied successfully.
    pub executed: usize,
    /// Lines rejected by the parser or the model.
    pub errors: usize,
    /// Whether a `quit` ended the run early.
    pub quit: bool,
}

/// Feed every line of `input` to `session`, writing replies to `output`.
///
/// Command errors are written as `error: ...` and counted; only I/O errors on
/// `input` or `output` abort the run.
pub fn run_lines<R: BufRead, W: Write>(
    session: &mut Session,
    input: R,
    mut output: W,
) -> AppResult<RunSummary> {
    let mut summary = RunSummary::default();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match session.execute_line(trimmed) {
            Ok(Reply::Done) => summary.executed += 1,
            Ok(Reply::Message(text)) => {
                summary.executed += 1;
                writeln!(output, "{}", text)?;
            }
            Ok(Reply::Quit) => {
                summary.quit = true;
                break;
            }
            Err(e) => {
                summary.errors += 1;
                warn!(line = index + 1, error = %e, "Console command rejected");
                writeln!(output, "error: {}", e)?;
            }
        }
        output.flush()?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockAdapter, MockHandle};
    use crate::channel::CommandChannel;

    fn session() -> (Session, MockHandle) {
        let adapter = MockAdapter::new();
        let handle = adapter.handle();
        let model = MotionModel::new(CommandChannel::with_sink(adapter));
        (Session::new(model), handle)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("START".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Start);
        assert_eq!(
            "speed 60".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Speed(60.0, SpeedUnit::Rpm)
        );
        assert_eq!(
            "speed 400 sps".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Speed(400.0, SpeedUnit::StepsPerSecond)
        );
        assert_eq!(
            "dir ccw".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Direction(Direction::CounterClockwise)
        );
        assert_eq!(
            "step -25".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Step(-25)
        );
        assert_eq!(
            "preset 28BYJ-48".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Preset(MotorPreset::Byj48)
        );
        assert_eq!(
            "mode step".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Mode(ModeRequest::Step(None))
        );
        assert_eq!(
            "mode step 50".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Mode(ModeRequest::Step(Some(50)))
        );
        assert_eq!(
            "note 440 250".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Note(440.0, 250)
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<ConsoleCommand>().is_err());
        assert!("fly".parse::<ConsoleCommand>().is_err());
        assert!("step".parse::<ConsoleCommand>().is_err());
        assert!("step ten".parse::<ConsoleCommand>().is_err());
        assert!("step 1.5".parse::<ConsoleCommand>().is_err());
        assert!("start now".parse::<ConsoleCommand>().is_err());
        assert!("key zz".parse::<ConsoleCommand>().is_err());
        assert!("decay -1".parse::<ConsoleCommand>().is_err());
        assert!("mode walk".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn test_step_mode_stops_motor() {
        let (mut session, handle) = session();
        session.execute_line("start").unwrap();
        session.execute_line("mode step 10").unwrap();

        assert!(!session.model().is_running());
        assert_eq!(session.mode(), DriveMode::Step(10));

        session.execute_line("exec").unwrap();
        session.execute_line("exec").unwrap();
        assert_eq!(session.model().state().current_step_count, 20);
        assert_eq!(handle.commands(), vec!["START", "STOP", "STEP 10", "STEP 10"]);
    }

    #[test]
    fn test_spin_mode_pushes_last_speed() {
        let (mut session, handle) = session();
        session.execute_line("speed 300 SPS").unwrap();
        session.execute_line("mode step").unwrap();
        session.execute_line("mode spin").unwrap();
        session.execute_line("exec").unwrap();

        assert_eq!(
            handle.commands(),
            vec!["SET_SPEED 300 SPS", "STOP", "SET_SPEED 300 SPS", "START"]
        );
        assert!(session.model().is_running());
    }

    #[test]
    fn test_step_count_persists_across_modes() {
        let (mut session, _handle) = session();
        session.execute_line("mode step 7").unwrap();
        session.execute_line("mode spin").unwrap();
        session.execute_line("mode step").unwrap();
        assert_eq!(session.mode(), DriveMode::Step(7));
    }

    #[test]
    fn test_angle_replies() {
        let (mut session, _handle) = session();
        assert_eq!(
            session.execute_line("goto 90").unwrap(),
            Reply::Message("Moved 50 steps".to_string())
        );
        assert_eq!(
            session.execute_line("angle").unwrap(),
            Reply::Message("Angle: 90.00°".to_string())
        );
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let (mut session, handle) = session();
        assert_eq!(session.execute_line("   ").unwrap(), Reply::Done);
        assert_eq!(session.execute_line("# step 10").unwrap(), Reply::Done);
        assert!(handle.is_empty());
    }

    #[test]
    fn test_key_and_octave() {
        let (mut session, handle) = session();
        session.execute_line("octave up").unwrap();
        session.execute_line("key z").unwrap();
        assert_eq!(handle.commands(), vec!["PLAY_NOTE 440 500"]);
        assert!(session.execute_line("key 1").is_err());
    }

    #[test]
    fn test_reset_restores_session() {
        let (mut session, handle) = session();
        session.execute_line("step 30").unwrap();
        session.execute_line("octave down").unwrap();
        session.execute_line("mode step 5").unwrap();
        handle.clear();

        session.execute_line("reset").unwrap();
        assert_eq!(handle.commands(), vec!["STOP", "HOME"]);
        assert_eq!(session.mode(), DriveMode::Spin);
        assert_eq!(session.model().state().current_step_count, 0);
        assert_eq!(session.notes().settings().octave_shift, 0);
    }

    #[test]
    fn test_status_mentions_position() {
        let (mut session, _handle) = session();
        session.execute_line("step 50").unwrap();
        let status = session.status();
        assert!(status.contains("Step count:     50"));
        assert!(status.contains("Angle:          90.00°"));
        assert!(status.contains("Full Step"));
    }

    #[test]
    fn test_run_lines_continues_after_errors() {
        let (mut session, handle) = session();
        let script = "\
# demo
step 10
bogus
step x
goto 0
quit
step 99
";
        let mut out = Vec::new();
        let summary = run_lines(&mut session, script.as_bytes(), &mut out).unwrap();

        assert_eq!(summary.executed, 2);
        assert_eq!(summary.errors, 2);
        assert!(summary.quit);
        assert_eq!(handle.commands(), vec!["STEP 10", "STEP -10"]);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("error:").count(), 2);
        assert!(text.contains("unknown command 'bogus'"));
    }

    #[test]
    fn test_model_errors_are_reported_not_fatal() {
        let (mut session, handle) = session();
        let script = "micro 0\ngoto nan\nstep 1\n";
        let mut out = Vec::new();
        let summary = run_lines(&mut session, script.as_bytes(), &mut out).unwrap();

        assert_eq!(summary.errors, 2);
        assert_eq!(summary.executed, 1);
        assert_eq!(handle.commands(), vec!["STEP 1"]);
    }
}
