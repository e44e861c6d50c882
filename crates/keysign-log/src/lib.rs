// ABOUTME: Shared logging setup for the ssh-keysign binary
// ABOUTME: Parses level/destination options and installs the tracing subscriber

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Application directory name used for the log file location.
const APP_NAME: &str = "ssh-keysign";

/// Rejected `--log-level` / `--log-destination` value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogOptionError {
    #[error("invalid log level: {0:?} (expected error|warn|info|debug)")]
    Level(String),

    #[error("invalid log destination: {0:?} (expected stderr|stdout|file)")]
    Destination(String),
}

/// Minimum severity that is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

impl FromStr for LogLevel {
    type Err = LogOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(LogOptionError::Level(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

/// Where log records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogDestination {
    #[default]
    Stderr,
    Stdout,
    File,
}

impl FromStr for LogDestination {
    type Err = LogOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stderr" => Ok(LogDestination::Stderr),
            "stdout" => Ok(LogDestination::Stdout),
            "file" => Ok(LogDestination::File),
            _ => Err(LogOptionError::Destination(s.to_string())),
        }
    }
}

impl fmt::Display for LogDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogDestination::Stderr => "stderr",
            LogDestination::Stdout => "stdout",
            LogDestination::File => "file",
        };
        f.write_str(s)
    }
}

/// Logging options resolved from flags, environment and config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub level: LogLevel,
    pub destination: LogDestination,
}

/// Path of the log file used by [`LogDestination::File`]
/// (`~/.local/state/ssh-keysign/ssh-keysign.log`, or the config dir on platforms without a state dir).
pub fn log_file_path() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::config_dir)
        .map(|d| d.join(APP_NAME).join(format!("{APP_NAME}.log")))
}

fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(level.as_tracing().into())
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the configured level.
///
/// If the log file cannot be opened, prints a warning to stderr and logs to stderr instead.
pub fn init(options: &LogOptions) {
    match options.destination {
        LogDestination::Stderr => init_stderr(options.level),
        LogDestination::Stdout => {
            let _ = tracing_subscriber::fmt()
                .with_writer(std::io::stdout)
                .with_env_filter(filter(options.level))
                .try_init();
        }
        LogDestination::File => {
            if let Err(e) = init_file_inner(options.level) {
                eprintln!("Warning: failed to set up file logging: {e}");
                init_stderr(options.level);
            }
        }
    }
}

fn init_stderr(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter(level))
        .try_init();
}

fn init_file_inner(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = log_file_path().ok_or("could not determine log directory")?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(log_file))
        .with_env_filter(filter(level))
        .with_ansi(false)
        .try_init()?;

    Ok(())
}
