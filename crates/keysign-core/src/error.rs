// ABOUTME: Error taxonomy for the certificate issuance pipeline.
// ABOUTME: Maps every failure to a kind that decides the process exit code.

use keysign_ssh::SshError;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a failure, used for exit codes and help output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unknown,
    /// Bad or missing CLI input.
    Usage,
    /// Token acquisition or validation failure.
    Auth,
    /// Transport-level failure (DNS, TLS, timeout, undecodable reply).
    Network,
    /// Key or certificate read/write failure.
    FileSystem,
    /// Interrupted by the caller.
    Canceled,
    /// Non-success HTTP status from the CA or OAuth server.
    Http,
    /// Malformed public key or certificate.
    Cert,
}

impl ErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Unknown => 1,
            ErrorKind::Usage => 2,
            ErrorKind::Network => 10,
            ErrorKind::Auth => 11,
            ErrorKind::Canceled => 12,
            ErrorKind::FileSystem => 13,
            ErrorKind::Http => 14,
            ErrorKind::Cert => 15,
        }
    }
}

/// Errors produced by the issuance pipeline.
#[derive(Error, Debug)]
pub enum KeysignError {
    #[error("{0}")]
    Usage(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{context}: {source}")]
    Network {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{context} {path}: {source}")]
    FileSystem {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}: operation canceled")]
    Canceled(String),

    #[error("{context}: HTTP {status}: {body}")]
    Http {
        context: String,
        status: u16,
        body: String,
    },

    #[error("{0}")]
    Cert(String),

    #[error(transparent)]
    Ssh(#[from] SshError),
}

impl KeysignError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeysignError::Usage(_) => ErrorKind::Usage,
            KeysignError::Auth(_) => ErrorKind::Auth,
            KeysignError::Network { .. } => ErrorKind::Network,
            KeysignError::FileSystem { .. } => ErrorKind::FileSystem,
            KeysignError::Canceled(_) => ErrorKind::Canceled,
            KeysignError::Http { .. } => ErrorKind::Http,
            KeysignError::Cert(_) => ErrorKind::Cert,
            KeysignError::Ssh(e) if e.is_filesystem() => ErrorKind::FileSystem,
            KeysignError::Ssh(e) if e.is_agent() => ErrorKind::Network,
            KeysignError::Ssh(_) => ErrorKind::Cert,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    pub(crate) fn network(context: impl Into<String>, source: reqwest::Error) -> Self {
        KeysignError::Network {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn filesystem(
        context: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        KeysignError::FileSystem {
            context: context.into(),
            path: path.into(),
            source,
        }
    }

    /// Re-label a token acquisition failure as an auth failure.
    /// Cancellation stays cancellation.
    pub fn into_auth(self) -> Self {
        match self {
            KeysignError::Auth(_) | KeysignError::Canceled(_) => self,
            other => KeysignError::Auth(other.to_string()),
        }
    }
}

/// Result type alias using KeysignError.
pub type Result<T> = std::result::Result<T, KeysignError>;
