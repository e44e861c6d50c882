// ABOUTME: Wire and domain types shared by the pipeline stages.
// ABOUTME: Access tokens, device flow replies, sign requests/responses and resolved keys.

use keysign_ssh::{Ed25519KeyPair, PublicKeyInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// OAuth token endpoint reply.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_expires_in: u64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

impl AccessToken {
    /// A usable token has a value, a positive lifetime, a type and a scope.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty()
            && self.expires_in > 0
            && !self.token_type.is_empty()
            && !self.scope.is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Device authorization endpoint reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceFlowStartResponse {
    pub device_code: String,
    #[serde(default)]
    pub user_code: String,
    #[serde(default)]
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: String,
    /// Seconds until the device code expires; zero when not advertised.
    #[serde(default)]
    pub expires_in: u64,
    /// Minimum seconds between polls; zero when not advertised.
    #[serde(default)]
    pub interval: u64,
}

/// Body of a 400 reply from the token poll endpoint while authorization is pending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthPending {
    pub error: String,
    #[serde(default)]
    pub error_description: String,
}

impl fmt::Display for AuthPending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.error_description.is_empty() {
            f.write_str(&self.error)
        } else {
            f.write_str(&self.error_description)
        }
    }
}

/// JSON body posted to the CA signing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub principal: String,
}

/// CA reply carrying the signed certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignedResponse {
    #[serde(rename = "signedKey")]
    pub signed_public_key: String,
    /// Certificate file name chosen by the CA, if any.
    #[serde(default)]
    pub filename: Option<String>,
}

/// Key material for one run: a public key read from disk, or a generated pair.
#[derive(Debug, Clone)]
pub enum Keys {
    File {
        /// Path as configured (before normalization).
        path: String,
        info: PublicKeyInfo,
    },
    Generated(Ed25519KeyPair),
}

impl Keys {
    pub fn public_key(&self) -> &str {
        match self {
            Keys::File { info, .. } => &info.public_key,
            Keys::Generated(pair) => &pair.public_key,
        }
    }

    pub fn key_type(&self) -> &str {
        match self {
            Keys::File { info, .. } => &info.key_type,
            Keys::Generated(pair) => &pair.key_type,
        }
    }

    /// Base name of the key file, sent to the CA so it can name the certificate.
    pub fn filename(&self) -> Option<String> {
        match self {
            Keys::File { path, .. } => Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            Keys::Generated(_) => None,
        }
    }
}

/// Files written for a generated key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKeyPair {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
    pub certificate: PathBuf,
}

/// Where a signed certificate ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredCert {
    File(PathBuf),
    KeyPair(StoredKeyPair),
    Agent { lifetime_secs: u64 },
}

impl fmt::Display for StoredCert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredCert::File(path) => write!(f, "certificate stored at {}", path.display()),
            StoredCert::KeyPair(stored) => write!(
                f,
                "certificate stored at {} (private key {})",
                stored.certificate.display(),
                stored.private_key.display()
            ),
            StoredCert::Agent { lifetime_secs } => write!(
                f,
                "certificate added to ssh-agent (lifetime {lifetime_secs}s)"
            ),
        }
    }
}
