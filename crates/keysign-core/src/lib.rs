// ABOUTME: Certificate issuance pipeline for ssh-keysign
// ABOUTME: Config, errors, OAuth authentication, CA signing and certificate storage

pub mod ca;
pub mod config;
pub mod error;
mod http;
pub mod keys;
pub mod oauth;
pub mod pipeline;
pub mod printer;
pub mod service;
pub mod store;
pub mod types;

pub use ca::CaCertClient;
pub use config::{
    Config, HostConfig, OAuthConfig, UserConfig, DEFAULT_HOST_DURATION_SECS,
    DEFAULT_USER_DURATION_SECS,
};
pub use error::{ErrorKind, KeysignError, Result};
pub use http::client as http_client;
pub use keys::SshKeyHandler;
pub use oauth::{BackoffConfig, CaAuthClient};
pub use pipeline::Runner;
pub use printer::{Printer, SharedBuffer, Verbosity};
pub use service::{CertClient, CertHandler, KeyHandler, OAuthClient};
pub use store::CaCertHandler;
pub use types::{
    AccessToken, AuthPending, DeviceFlowStartResponse, Keys, SignRequest, SignedResponse,
    StoredCert, StoredKeyPair,
};
pub use tokio_util::sync::CancellationToken;
