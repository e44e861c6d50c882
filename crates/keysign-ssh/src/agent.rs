// ABOUTME: ssh-agent client for adding a generated key together with its certificate.
// ABOUTME: Sends a constrained add-identity request through ssh-agent-lib over the agent's Unix socket.

use crate::error::{Result, SshError};
use ssh_agent_lib::agent::Session;
use ssh_agent_lib::client::Client;
use ssh_agent_lib::proto::{
    AddIdentity, AddIdentityConstrained, KeyConstraint, Credential, PrivateKeyData,
};
use ssh_key::private::KeypairData;
use ssh_key::{Certificate, PrivateKey};
use std::path::Path;
use std::time::Duration;
use tokio::net::UnixStream;

/// Upper bound on the whole agent exchange.
pub const AGENT_TIMEOUT: Duration = Duration::from_secs(10);

/// A private key plus its certificate, as handed to ssh-agent.
pub struct AddedKey<'a> {
    /// Key the certificate was issued for (ed25519 only).
    pub private_key: &'a PrivateKey,
    pub certificate: &'a Certificate,
    pub comment: String,
    /// Must be non-zero; the key is always loaded with a lifetime.
    pub lifetime_secs: u32,
    pub confirm_before_use: bool,
}

/// Build the constrained add-identity request for `key`.
///
/// # Errors
/// Returns `SshError::UnsupportedKeyType` for non-ed25519 keys and
/// `SshError::InvalidLifetime` for a zero lifetime.
pub fn add_identity_request(key: &AddedKey<'_>) -> Result<AddIdentityConstrained> {
    if key.lifetime_secs == 0 {
        return Err(SshError::InvalidLifetime);
    }

    let privkey = match key.private_key.key_data() {
        KeypairData::Ed25519(keypair) => PrivateKeyData::Ed25519(keypair.clone()),
        other => {
            return Err(SshError::UnsupportedKeyType(format!(
                "{:?}",
                other.algorithm()
            )))
        }
    };

    let mut constraints = vec![KeyConstraint::Lifetime(key.lifetime_secs)];
    if key.confirm_before_use {
        constraints.push(KeyConstraint::Confirm);
    }

    Ok(AddIdentityConstrained {
        identity: AddIdentity {
            credential: Credential::Cert {
                algorithm: key.certificate.algorithm(),
                certificate: Box::new(key.certificate.clone()),
                privkey,
                comment: key.comment.clone(),
            },
        },
        constraints,
    })
}

/// Add `key` to the agent listening on `socket`.
///
/// The connection is opened for this single request and dropped on return.
/// The exchange is abandoned after [`AGENT_TIMEOUT`].
///
/// # Errors
/// Returns an error if the socket cannot be reached, the agent does not
/// answer in time, or it refuses the key.
pub async fn add_certificate(socket: &Path, key: &AddedKey<'_>) -> Result<()> {
    let request = add_identity_request(key)?;

    tokio::time::timeout(AGENT_TIMEOUT, async {
        let stream = UnixStream::connect(socket)
            .await
            .map_err(|e| SshError::AgentConnect {
                path: socket.to_path_buf(),
                source: e,
            })?;

        let mut client = Client::new(stream);
        client
            .add_identity_constrained(request)
            .await
            .map_err(SshError::Agent)
    })
    .await
    .map_err(|_| SshError::AgentTimeout(AGENT_TIMEOUT))?
}
