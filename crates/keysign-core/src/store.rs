// ABOUTME: Production CertHandler persisting signed certificates
// ABOUTME: Writes certificate files, generated key pairs, or loads key + certificate into ssh-agent

use crate::error::{KeysignError, Result};
use crate::service::CertHandler;
use crate::types::{SignedResponse, StoredCert, StoredKeyPair};
use async_trait::async_trait;
use keysign_ssh::{AddedKey, Ed25519KeyPair, SshError};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Stores certificates on the local filesystem or in ssh-agent.
#[derive(Debug, Clone, Copy)]
pub struct CaCertHandler {
    confirm_before_use: bool,
}

impl Default for CaCertHandler {
    fn default() -> Self {
        Self {
            confirm_before_use: crate::config::CONFIRM_CERT_BEFORE_USE,
        }
    }
}

#[async_trait]
impl CertHandler for CaCertHandler {
    fn store_certificate_file(
        &self,
        key_path: &str,
        signed: &SignedResponse,
    ) -> Result<StoredCert> {
        let path = match signed.filename.as_deref().filter(|f| !f.is_empty()) {
            Some(name) => keysign_ssh::named_certificate_path(key_path, name)?,
            None => keysign_ssh::certificate_file_path(key_path)?,
        };

        info!(filename = %path.display(), "storing certificate");
        keysign_ssh::write_private_file(&path, &line(&signed.signed_public_key))?;

        Ok(StoredCert::File(path))
    }

    fn store_key_pair(
        &self,
        ssh_dir: &Path,
        pair: &Ed25519KeyPair,
        signed: &SignedResponse,
    ) -> Result<StoredCert> {
        keysign_ssh::ensure_private_dir(ssh_dir)?;

        let base = keysign_ssh::random_key_file_name();
        let stored = StoredKeyPair {
            private_key: ssh_dir.join(&base),
            public_key: ssh_dir.join(format!("{base}.pub")),
            certificate: ssh_dir.join(format!("{base}-cert.pub")),
        };

        info!(filename = %stored.private_key.display(), "storing generated key pair");
        keysign_ssh::write_private_file(&stored.private_key, &pair.private_key_pem)?;
        keysign_ssh::write_private_file(&stored.public_key, &line(&pair.public_key))?;
        keysign_ssh::write_private_file(&stored.certificate, &line(&signed.signed_public_key))?;

        Ok(StoredCert::KeyPair(stored))
    }

    async fn add_to_agent(
        &self,
        socket: &Path,
        pair: &Ed25519KeyPair,
        signed: &SignedResponse,
        default_lifetime_secs: u64,
        cancel: &CancellationToken,
    ) -> Result<StoredCert> {
        let certificate = keysign_ssh::parse_certificate(&signed.signed_public_key)?;
        if certificate.public_key() != pair.private_key.public_key().key_data() {
            return Err(SshError::CertificateKeyMismatch.into());
        }

        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        let lifetime_secs =
            keysign_ssh::agent_lifetime(default_lifetime_secs, certificate.valid_before(), now);
        if lifetime_secs == 0 {
            return Err(SshError::CertificateExpired.into());
        }

        let key = AddedKey {
            private_key: &pair.private_key,
            certificate: &certificate,
            comment: chrono::Local::now().to_rfc3339(),
            lifetime_secs: u32::try_from(lifetime_secs).unwrap_or(u32::MAX),
            confirm_before_use: self.confirm_before_use,
        };

        info!(
            key_id = certificate.key_id(),
            duration = lifetime_secs,
            "adding certificate to ssh-agent"
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(KeysignError::Canceled("adding certificate to ssh-agent".into()));
            }
            added = keysign_ssh::add_certificate(socket, &key) => added?,
        }

        Ok(StoredCert::Agent { lifetime_secs })
    }
}

/// The value with exactly one trailing newline.
fn line(value: &str) -> String {
    format!("{}\n", value.trim_end())
}
