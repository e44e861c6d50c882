// ABOUTME: Error types for SSH key, certificate and agent operations using thiserror.
// ABOUTME: Provides typed errors for key loading, generation, certificate parsing and agent calls.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during SSH key operations.
#[derive(Error, Debug)]
pub enum SshError {
    /// The user's home directory could not be determined.
    #[error("could not determine home directory")]
    HomeDirectory,

    /// Failed to read a key file from disk.
    #[error("failed to read SSH key from {path}: {source}")]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse an SSH public key file.
    #[error("failed to parse SSH key from {path}: {source}")]
    ParseKey {
        path: PathBuf,
        #[source]
        source: ssh_key::Error,
    },

    /// Failed to parse an authorized-keys line.
    #[error("failed to parse public key: {0}")]
    ParsePublicKey(#[source] ssh_key::Error),

    /// Failed to generate an SSH key.
    #[error("failed to generate SSH key: {0}")]
    GenerateKey(#[source] ssh_key::Error),

    /// Failed to serialize a key.
    #[error("failed to serialize key: {0}")]
    SerializeKey(#[source] ssh_key::Error),

    /// Failed to write a key or certificate file to disk.
    #[error("failed to write {path}: {source}")]
    WriteKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a directory.
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set file permissions.
    #[error("failed to set permissions on {path}: {source}")]
    SetPermissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A path could not be turned into a certificate location.
    #[error("invalid path {0:?}")]
    InvalidPath(String),

    /// Unsupported key type for the requested operation.
    #[error("unsupported key type: {0} (only ed25519 is supported)")]
    UnsupportedKeyType(String),

    /// The signed blob returned by the CA is not an OpenSSH certificate.
    #[error("provided blob is not an ssh certificate (found {0:?})")]
    NotACertificate(String),

    /// Failed to parse the signed certificate.
    #[error("failed to parse ssh certificate: {0}")]
    ParseCertificate(#[source] ssh_key::Error),

    /// The certificate is no longer valid.
    #[error("certificate already expired")]
    CertificateExpired,

    /// An agent key must always carry a lifetime.
    #[error("ssh-agent key lifetime must be greater than zero")]
    InvalidLifetime,

    /// The certificate was issued for a different key than the one held.
    #[error("certificate does not match the private key")]
    CertificateKeyMismatch,

    /// Could not connect to the ssh-agent socket.
    #[error("connect to ssh-agent at {path}: {source}")]
    AgentConnect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The agent failed or refused to add the key and certificate.
    #[error("ssh-agent refused to add key and certificate: {0}")]
    Agent(#[source] ssh_agent_lib::error::AgentError),

    /// The agent did not answer in time.
    #[error("ssh-agent did not respond within {0:?}")]
    AgentTimeout(std::time::Duration),
}

impl SshError {
    /// True for local filesystem failures (as opposed to format or agent problems).
    pub fn is_filesystem(&self) -> bool {
        matches!(
            self,
            SshError::HomeDirectory
                | SshError::ReadKey { .. }
                | SshError::WriteKey { .. }
                | SshError::CreateDirectory { .. }
                | SshError::SetPermissions { .. }
                | SshError::InvalidPath(_)
        )
    }

    /// True for failures while connecting to or talking with the ssh-agent.
    pub fn is_agent(&self) -> bool {
        matches!(
            self,
            SshError::AgentConnect { .. } | SshError::Agent(_) | SshError::AgentTimeout(_)
        )
    }
}

/// Result type alias using SshError.
pub type Result<T> = std::result::Result<T, SshError>;
