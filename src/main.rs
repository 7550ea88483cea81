//! CLI Entry Point for drivester
//!
//! Provides command-line interface for:
//! - An interactive console on stdin
//! - Running console scripts (one command per line)
//! - Printing the effective configuration
//!
//! # Usage
//!
//! Interactive console against a real port:
//! ```bash
//! drivester console --port /dev/ttyUSB0
//! ```
//!
//! Run a script without hardware:
//! ```bash
//! drivester run demos/square_dance.txt --mock
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use drivester::channel::CommandChannel;
use drivester::config::DrivesterConfig;
use drivester::console::{run_lines, RunSummary, Session};
use drivester::motion::MotionModel;
use drivester::telemetry::{LogSettings, OutputFormat};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "drivester")]
#[command(about = "Stepper motor controller for serial-attached drivers", long_about = None)]
struct Cli {
    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: OutputFormat,

    /// More log output; repeat for trace
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Log every command line written to the device
    #[arg(long, global = true)]
    trace_commands: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Config file (defaults to config/drivester.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port, overriding the config file
    #[arg(long, conflicts_with = "mock")]
    port: Option<String>,

    /// Do not open any port; log every command instead
    #[arg(long)]
    mock: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read commands from stdin until `quit` or end of input
    Console {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Execute a console script file
    Run {
        /// Path to the script
        script: PathBuf,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Config file (defaults to config/drivester.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Console { connection } => {
            let config = load_config(connection.config.as_deref(), connection.port.as_deref())?;
            init_logging(&config, &cli)?;
            let mut session = open_session(&config, connection.mock)?;

            println!("drivester console. Type 'help' for commands, 'quit' to exit.");
            let summary = run_lines(&mut session, io::stdin().lock(), io::stdout().lock())?;
            finish(&session, summary);
            Ok(())
        }
        Commands::Run { script, connection } => {
            let config = load_config(connection.config.as_deref(), connection.port.as_deref())?;
            init_logging(&config, &cli)?;

            let file = File::open(&script)
                .with_context(|| format!("Failed to open script {}", script.display()))?;
            let mut session = open_session(&config, connection.mock)?;

            info!("Running script {}", script.display());
            let summary = run_lines(&mut session, BufReader::new(file), io::stdout().lock())?;
            finish(&session, summary);

            if summary.errors > 0 {
                anyhow::bail!("{} command(s) in {} failed", summary.errors, script.display());
            }
            Ok(())
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref(), None)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>, port: Option<&str>) -> Result<DrivesterConfig> {
    let mut config = match path {
        Some(path) => DrivesterConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => DrivesterConfig::load().context("Failed to load configuration")?,
    };
    if let Some(port) = port {
        config.serial.port = Some(port.to_string());
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_logging(config: &DrivesterConfig, cli: &Cli) -> Result<()> {
    LogSettings::from_config(config)?
        .format(cli.log_format)
        .verbosity(cli.verbose)
        .trace_commands(cli.trace_commands)
        .install()?;
    Ok(())
}

fn open_session(config: &DrivesterConfig, mock: bool) -> Result<Session> {
    let channel = if mock {
        info!("Mock mode requested; no serial port will be opened");
        CommandChannel::detached()
    } else {
        CommandChannel::open_serial(&config.serial)
    };

    let model = MotionModel::from_settings(channel, &config.motor)?;
    Ok(Session::with_settings(
        model,
        config.motor.default_speed_rpm,
        config.notes.clone(),
    ))
}

fn finish(session: &Session, summary: RunSummary) {
    let channel = session.model().channel();
    let stats = channel.stats();
    info!(
        executed = summary.executed,
        errors = summary.errors,
        delivered = stats.delivered,
        mocked = stats.mocked,
        failed = stats.failed,
        "Session finished"
    );
    channel.close();
}
