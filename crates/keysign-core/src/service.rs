// ABOUTME: Capability traits for the pipeline stages
// ABOUTME: KeyHandler, OAuthClient, CertClient and CertHandler, injected into the Runner

use crate::config::{HostConfig, OAuthConfig, UserConfig};
use crate::error::Result;
use crate::printer::Printer;
use crate::types::{AccessToken, Keys, SignedResponse, StoredCert};
use async_trait::async_trait;
use keysign_ssh::{Ed25519KeyPair, PublicKeyInfo};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Loads or creates the key to be certified.
pub trait KeyHandler: Send + Sync {
    /// Read and normalize an authorized-keys style public key file.
    fn read_public_key(&self, path: &str) -> Result<PublicKeyInfo>;

    /// Generate a fresh ed25519 key pair.
    fn new_ed25519(&self) -> Result<Ed25519KeyPair>;
}

/// Obtains an access token from the identity provider.
///
/// Implementations do not judge the token's contents; the caller checks
/// [`AccessToken::is_valid`].
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Client credentials grant: one request, no operator interaction.
    async fn client_credential_login(
        &self,
        oauth: &OAuthConfig,
        printer: &Printer,
        cancel: &CancellationToken,
    ) -> Result<AccessToken>;

    /// Device authorization grant: prompt the operator, then poll until approved.
    async fn device_flow_login(
        &self,
        oauth: &OAuthConfig,
        printer: &Printer,
        cancel: &CancellationToken,
    ) -> Result<AccessToken>;
}

/// Submits public keys to the CA for signing.
#[async_trait]
pub trait CertClient: Send + Sync {
    async fn issue_host_cert(
        &self,
        host: &HostConfig,
        oauth: &OAuthConfig,
        keys: &Keys,
        token: &AccessToken,
        cancel: &CancellationToken,
    ) -> Result<SignedResponse>;

    async fn issue_user_cert(
        &self,
        user: &UserConfig,
        oauth: &OAuthConfig,
        keys: &Keys,
        token: &AccessToken,
        cancel: &CancellationToken,
    ) -> Result<SignedResponse>;
}

/// Persists a signed certificate.
#[async_trait]
pub trait CertHandler: Send + Sync {
    /// Write the certificate next to the key file it was issued for.
    fn store_certificate_file(&self, key_path: &str, signed: &SignedResponse)
        -> Result<StoredCert>;

    /// Write a generated key pair and its certificate into `ssh_dir`.
    fn store_key_pair(
        &self,
        ssh_dir: &Path,
        pair: &Ed25519KeyPair,
        signed: &SignedResponse,
    ) -> Result<StoredCert>;

    /// Load a generated key and its certificate into ssh-agent.
    ///
    /// The agent lifetime is `default_lifetime_secs`, shortened to the
    /// certificate's remaining validity when that is sooner. The key is
    /// never loaded without a lifetime.
    async fn add_to_agent(
        &self,
        socket: &Path,
        pair: &Ed25519KeyPair,
        signed: &SignedResponse,
        default_lifetime_secs: u64,
        cancel: &CancellationToken,
    ) -> Result<StoredCert>;
}
