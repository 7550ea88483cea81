//! Logging setup.
//!
//! Everything in the crate reports through `tracing`; this module installs the
//! `tracing-subscriber` stack for the binary (or any embedding application
//! that wants the same output):
//! - pretty, compact, or JSON events on stderr
//! - base level from `application.log_level`, raised by `-v` flags
//! - optional command trace: every line the channel writes, at debug
//! - `RUST_LOG` replaces all of the above when set
//!
//! # Example
//! ```no_run
//! use drivester::{config::DrivesterConfig, telemetry::LogSettings};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DrivesterConfig::load()?;
//! LogSettings::from_config(&config)?.trace_commands(true).install()?;
//! tracing::info!("Controller started");
//! # Ok(())
//! # }
//! ```

use crate::config::DrivesterConfig;
use crate::error::{AppResult, DriveError};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Target of the per-command debug events.
const COMMAND_TARGET: &str = "drivester::channel";

/// How events are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line, human oriented
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "Unknown log format '{}'. Expected pretty, compact or json",
                other
            )),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Minimum level for every target
    pub level: Level,
    /// Event rendering
    pub format: OutputFormat,
    /// Log each command line the channel writes, regardless of `level`
    pub command_trace: bool,
    /// Source file and line on each event
    pub with_source_location: bool,
    /// ANSI colours (ignored for JSON)
    pub with_ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::default(),
            command_trace: false,
            with_source_location: false,
            with_ansi: true,
        }
    }
}

impl LogSettings {
    /// Settings seeded from `application.log_level`.
    pub fn from_config(config: &DrivesterConfig) -> AppResult<Self> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            ..Self::default()
        })
    }

    /// Use `format` for output.
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Raise verbosity by `steps` levels (info, then debug, then trace).
    pub fn verbosity(mut self, steps: u8) -> Self {
        for _ in 0..steps {
            self.level = match self.level {
                Level::ERROR => Level::WARN,
                Level::WARN => Level::INFO,
                Level::INFO => Level::DEBUG,
                _ => Level::TRACE,
            };
        }
        self
    }

    /// Log every command line the channel writes.
    pub fn trace_commands(mut self, enabled: bool) -> Self {
        self.command_trace = enabled;
        self
    }

    /// Enable or disable colours.
    pub fn ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    /// Filter directives these settings produce, e.g.
    /// `info,drivester::channel=debug`.
    pub fn directives(&self) -> String {
        let base = self.level.as_str().to_ascii_lowercase();
        // Level ordering: more verbose compares greater
        if self.command_trace && self.level < Level::DEBUG {
            format!("{},{}=debug", base, COMMAND_TARGET)
        } else {
            base
        }
    }

    fn filter(&self) -> AppResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(self.directives())
            .map_err(|e| DriveError::Configuration(format!("Bad log filter: {}", e)))
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(self.with_source_location)
            .with_line_number(self.with_source_location);

        match self.format {
            OutputFormat::Pretty => base
                .pretty()
                .with_span_events(FmtSpan::NONE)
                .with_ansi(self.with_ansi)
                .boxed(),
            OutputFormat::Compact => base.compact().with_ansi(self.with_ansi).boxed(),
            OutputFormat::Json => base.json().with_ansi(false).boxed(),
        }
    }

    /// Install as the global subscriber.
    ///
    /// Logs go to stderr so console replies on stdout stay clean. If another
    /// subscriber is already installed this is a no-op.
    pub fn install(self) -> AppResult<()> {
        let filter = self.filter()?;
        match tracing_subscriber::registry()
            .with(self.layer().with_filter(filter))
            .try_init()
        {
            Ok(()) => Ok(()),
            Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
            Err(e) => Err(DriveError::Configuration(format!(
                "Failed to install log subscriber: {}",
                e
            ))),
        }
    }
}

/// Parse a level name, case-insensitively.
pub fn parse_log_level(level: &str) -> AppResult<Level> {
    Level::from_str(level.trim()).map_err(|_| {
        DriveError::Configuration(format!(
            "Unknown log level '{}'. Expected trace, debug, info, warn or error",
            level
        ))
    })
}
