// ABOUTME: Certificate file naming, signed certificate parsing and agent lifetime math.
// ABOUTME: Derives `-cert` paths from key paths and inspects OpenSSH certificate validity.

use crate::error::{Result, SshError};
use crate::key::normalize_path;
use rand::Rng;
use ssh_key::Certificate;
use std::path::{Path, PathBuf};

/// Suffix OpenSSH uses for certificate algorithm names.
const CERT_ALGORITHM_SUFFIX: &str = "-cert-v01@openssh.com";

/// Validity value OpenSSH uses for "never expires".
pub const CERT_TIME_INFINITY: u64 = u64::MAX;

/// Derive the certificate path for a key file by inserting `-cert` before
/// the extension: `/a/b/id_ed25519.pub` becomes `/a/b/id_ed25519-cert.pub`.
///
/// The key path is normalized first and the result is absolute.
///
/// # Errors
/// Returns a filesystem error if the path cannot be normalized or made absolute.
pub fn certificate_file_path(key_path: &str) -> Result<PathBuf> {
    let normalized = normalize_path(key_path)?;

    let stem = normalized
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| SshError::InvalidPath(key_path.to_string()))?;

    let cert_name = match normalized.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}-cert.{ext}"),
        None => format!("{stem}-cert"),
    };

    absolute(&normalized.with_file_name(cert_name), key_path)
}

/// Place a CA-provided certificate file name next to the key file.
///
/// Only the final component of `filename` is used, so a server cannot
/// direct the write outside the key's directory.
///
/// # Errors
/// Returns `SshError::InvalidPath` if `filename` has no usable file name.
pub fn named_certificate_path(key_path: &str, filename: &str) -> Result<PathBuf> {
    let normalized = normalize_path(key_path)?;

    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| SshError::InvalidPath(filename.to_string()))?;

    absolute(&normalized.with_file_name(name), key_path)
}

fn absolute(path: &Path, original: &str) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|_| SshError::InvalidPath(original.to_string()))
}

/// Random base name for a generated key pair: `id_<10 digits>-<YYYYmmdd_HH_MM_SS>`.
pub fn random_key_file_name() -> String {
    let digits: u64 = rand::thread_rng().gen_range(1_000_000_000..=9_999_999_999);
    let timestamp = chrono::Local::now().format("%Y%m%d_%H_%M_%S");
    format!("id_{digits}-{timestamp}")
}

/// Parse the CA's signed blob (an authorized-keys style certificate line).
///
/// # Errors
/// Returns `SshError::NotACertificate` if the line holds a plain public key,
/// or `SshError::ParseCertificate` if it cannot be decoded.
pub fn parse_certificate(signed: &str) -> Result<Certificate> {
    let line = signed.trim();
    let algorithm = line.split_whitespace().next().unwrap_or_default();

    if !algorithm.ends_with(CERT_ALGORITHM_SUFFIX) {
        return Err(SshError::NotACertificate(algorithm.to_string()));
    }

    Certificate::from_openssh(line).map_err(SshError::ParseCertificate)
}

/// Lifetime to request from ssh-agent: the default, shortened to the time left
/// until the certificate's `valid_before` when that is sooner.
///
/// Certificates that never expire keep the default. An already expired
/// certificate yields zero.
pub fn agent_lifetime(default_secs: u64, valid_before: u64, now: u64) -> u64 {
    if valid_before == CERT_TIME_INFINITY {
        default_secs
    } else {
        default_secs.min(valid_before.saturating_sub(now))
    }
}
