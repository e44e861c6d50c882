// ABOUTME: SSH public key loading and ed25519 key pair generation.
// ABOUTME: Normalizes key paths and re-serializes keys into single authorized-keys lines.

use crate::error::{Result, SshError};
use ssh_key::{Algorithm, LineEnding, PrivateKey, PublicKey};
use std::fmt;
use std::path::{Path, PathBuf};

/// Parsed public key: the algorithm name and the normalized authorized-keys line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyInfo {
    /// Algorithm name, e.g. `ssh-ed25519`.
    pub key_type: String,
    /// `<type> <base64>` without comment or trailing whitespace.
    pub public_key: String,
}

/// A freshly generated ed25519 key pair.
#[derive(Clone)]
pub struct Ed25519KeyPair {
    /// The private key, used when loading into ssh-agent.
    pub private_key: PrivateKey,
    /// Unencrypted OpenSSH PEM encoding of the private key.
    pub private_key_pem: String,
    /// Authorized-keys line for the public half.
    pub public_key: String,
    /// Same convention as [`PublicKeyInfo::key_type`].
    pub key_type: String,
}

impl fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519KeyPair")
            .field("private_key_pem", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .field("key_type", &self.key_type)
            .finish()
    }
}

/// Expand a leading `~` or `$HOME` to the home directory, then any other
/// environment variables (undefined variables expand to the empty string).
///
/// # Errors
/// Returns `SshError::HomeDirectory` if the home directory cannot be resolved.
pub fn normalize_path(path: &str) -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(SshError::HomeDirectory)?;

    if let Some(rest) = path.strip_prefix('~') {
        return Ok(join_home(&home, rest));
    }

    if let Some(rest) = path.strip_prefix("$HOME") {
        return Ok(join_home(&home, rest));
    }

    let expanded = shellexpand::env_with_context_no_errors(path, |var: &str| {
        Some(std::env::var(var).unwrap_or_default())
    });
    Ok(PathBuf::from(expanded.as_ref()))
}

fn join_home(home: &Path, rest: &str) -> PathBuf {
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        home.to_path_buf()
    } else {
        home.join(rest)
    }
}

/// Parse the first authorized-keys line in `data` and re-serialize it without comment.
///
/// Blank lines and `#` comment lines are skipped.
///
/// # Errors
/// Returns `SshError::ParsePublicKey` when no valid key line is found.
pub fn parse_public_key(data: &str) -> Result<PublicKeyInfo> {
    let line = data
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .unwrap_or_default();

    let mut key = PublicKey::from_openssh(line).map_err(SshError::ParsePublicKey)?;
    key.set_comment("");

    let public_key = key.to_openssh().map_err(SshError::SerializeKey)?;

    Ok(PublicKeyInfo {
        key_type: key.algorithm().as_str().to_string(),
        public_key: public_key.trim_end().to_string(),
    })
}

/// Read a public key file (authorized-keys format) after path normalization.
///
/// # Errors
/// Returns a filesystem error if the file cannot be read, or
/// `SshError::ParseKey` if its content is not a public key.
pub fn read_public_key(path: &str) -> Result<PublicKeyInfo> {
    let path = normalize_path(path)?;

    let data = std::fs::read_to_string(&path).map_err(|e| SshError::ReadKey {
        path: path.clone(),
        source: e,
    })?;

    parse_public_key(&data).map_err(|e| match e {
        SshError::ParsePublicKey(source) => SshError::ParseKey { path, source },
        other => other,
    })
}

/// Generate a new ed25519 key pair in memory.
///
/// The private key is encoded as an unencrypted OpenSSH PEM block and the
/// public key goes through [`parse_public_key`] so both key sources report
/// the same `key_type` and formatting.
///
/// # Errors
/// Returns an error if key generation or serialization fails.
pub fn new_ed25519() -> Result<Ed25519KeyPair> {
    let private_key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
        .map_err(SshError::GenerateKey)?;

    let private_key_pem = private_key
        .to_openssh(LineEnding::LF)
        .map_err(SshError::SerializeKey)?
        .to_string();

    let public_openssh = private_key
        .public_key()
        .to_openssh()
        .map_err(SshError::SerializeKey)?;
    let info = parse_public_key(&public_openssh)?;

    Ok(Ed25519KeyPair {
        private_key,
        private_key_pem,
        public_key: info.public_key,
        key_type: info.key_type,
    })
}
