// ABOUTME: Errors raised by the command line layer before or around the pipeline
// ABOUTME: Config file and log option failures, plus pipeline errors passed through

use keysign_core::{ErrorKind, KeysignError};
use keysign_log::LogOptionError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("reading config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    LogOption(#[from] LogOptionError),

    #[error(transparent)]
    Keysign(#[from] KeysignError),
}

impl CliError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CliError::ConfigRead { .. } | CliError::ConfigParse { .. } => ErrorKind::FileSystem,
            CliError::LogOption(_) => ErrorKind::Usage,
            CliError::Keysign(e) => e.kind(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}
