// ABOUTME: Resolved configuration handed to the issuance pipeline.
// ABOUTME: OAuth, host and user settings plus validation of required combinations.

use crate::error::{KeysignError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Host certificates default to one year.
pub const DEFAULT_HOST_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// User certificates (and ssh-agent lifetimes) default to 30 minutes.
pub const DEFAULT_USER_DURATION_SECS: u64 = 30 * 60;

/// Keys added to ssh-agent ask for confirmation before each use.
pub const CONFIRM_CERT_BEFORE_USE: bool = true;

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// OAuth endpoints and client credentials, plus the CA server URL.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OAuthConfig {
    pub server_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_url: Option<String>,
    pub device_flow_url: Option<String>,
    pub token_poll_url: Option<String>,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("server_url", &self.server_url)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_url", &self.token_url)
            .field("device_flow_url", &self.device_flow_url)
            .field("token_poll_url", &self.token_poll_url)
            .finish()
    }
}

impl OAuthConfig {
    /// Server URL, token URL, client id and client secret are all set.
    pub fn has_client_credential(&self) -> bool {
        is_set(&self.server_url)
            && is_set(&self.token_url)
            && is_set(&self.client_id)
            && is_set(&self.client_secret)
    }

    /// Server URL and device flow URL are set.
    pub fn has_device_flow(&self) -> bool {
        is_set(&self.server_url) && is_set(&self.device_flow_url)
    }

    fn missing_client_credential(&self) -> Vec<&'static str> {
        let mut missing = self.missing_client();
        if !is_set(&self.token_url) {
            missing.push("--token-url");
        }
        missing
    }

    fn missing_device_flow(&self) -> Vec<&'static str> {
        let mut missing = self.missing_client();
        if !is_set(&self.device_flow_url) {
            missing.push("--device-flow-url");
        }
        if !is_set(&self.token_poll_url) {
            missing.push("--token-poll-url");
        }
        missing
    }

    fn missing_client(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !is_set(&self.client_id) {
            missing.push("--client-id");
        }
        if !is_set(&self.client_secret) {
            missing.push("--client-secret");
        }
        missing
    }
}

/// Settings for the `host` flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Path to the host's public key file.
    pub key: Option<String>,
    pub principals: Vec<String>,
    pub duration_seconds: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            key: None,
            principals: Vec::new(),
            duration_seconds: DEFAULT_HOST_DURATION_SECS,
        }
    }
}

/// Settings for the `user` flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConfig {
    /// Public key file; when absent a fresh ed25519 pair is generated.
    pub key: Option<String>,
    pub principals: Vec<String>,
    pub duration_seconds: u64,
    /// Load the generated key and certificate into ssh-agent instead of writing files.
    pub agent: bool,
    /// ssh-agent socket (`SSH_AUTH_SOCK`), resolved at startup.
    pub agent_socket: Option<PathBuf>,
    /// Where generated key pairs are written (`~/.ssh`), resolved at startup.
    pub ssh_dir: Option<PathBuf>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            key: None,
            principals: Vec::new(),
            duration_seconds: DEFAULT_USER_DURATION_SECS,
            agent: false,
            agent_socket: None,
            ssh_dir: None,
        }
    }
}

/// Fully resolved configuration, built once and passed into the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub oauth: OAuthConfig,
    pub host: HostConfig,
    pub user: UserConfig,
}

fn missing_error(missing: &[&str]) -> KeysignError {
    KeysignError::Usage(format!(
        "missing required parameters: {}",
        missing.join(", ")
    ))
}

impl Config {
    /// Host flow: key, principal, CA server and complete client credentials.
    ///
    /// # Errors
    /// Returns a usage error naming every missing flag, or a filesystem error
    /// if the key file does not exist.
    pub fn validate_host(&self) -> Result<()> {
        let mut missing = Vec::new();
        if !is_set(&self.host.key) {
            missing.push("--key");
        }
        if self.host.principals.is_empty() {
            missing.push("--principal");
        }
        if !missing.is_empty() {
            return Err(missing_error(&missing));
        }

        if !is_set(&self.oauth.server_url) {
            return Err(KeysignError::Usage("--ca-server-url is required".into()));
        }

        let missing = self.oauth.missing_client_credential();
        if !missing.is_empty() {
            return Err(missing_error(&missing));
        }

        validate_duration(self.host.duration_seconds)?;
        validate_key_file(self.host.key.as_deref().unwrap_or_default())
    }

    /// User flow: principal, CA server and either complete client credentials
    /// or a complete device flow set. A partially specified set is rejected.
    ///
    /// # Errors
    /// Returns a usage error describing the first problem found, or a
    /// filesystem error if a given key file does not exist.
    pub fn validate_user(&self) -> Result<()> {
        if self.user.principals.is_empty() {
            return Err(missing_error(&["--principal"]));
        }

        if !is_set(&self.oauth.server_url) {
            return Err(KeysignError::Usage("--ca-server-url is required".into()));
        }

        let oauth = &self.oauth;
        let client_credential = oauth.missing_client_credential();
        let device_flow = oauth.missing_device_flow();

        if !client_credential.is_empty() && !device_flow.is_empty() {
            let credential_started = is_set(&oauth.token_url);
            let device_started = is_set(&oauth.device_flow_url) || is_set(&oauth.token_poll_url);

            return Err(match (credential_started, device_started) {
                (false, true) => missing_error(&device_flow),
                (true, _) => missing_error(&client_credential),
                (false, false) => KeysignError::Usage(format!(
                    "either client credentials ({}) or device flow ({}) must be configured",
                    client_credential.join(", "),
                    device_flow.join(", ")
                )),
            });
        }

        validate_duration(self.user.duration_seconds)?;

        match self.user.key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => {
                if self.user.agent {
                    return Err(KeysignError::Usage(
                        "--agent requires a generated key; it cannot be combined with --key".into(),
                    ));
                }
                validate_key_file(key)
            }
            None if self.user.agent => match self.user.agent_socket.as_deref() {
                Some(socket) => validate_agent_socket(socket),
                None => Err(KeysignError::Usage(
                    "SSH_AUTH_SOCK not set; is ssh-agent running?".into(),
                )),
            },
            None => Ok(()),
        }
    }
}

fn validate_duration(seconds: u64) -> Result<()> {
    if seconds == 0 {
        return Err(KeysignError::Usage(
            "--duration must be greater than zero".into(),
        ));
    }
    Ok(())
}

/// The agent socket must exist and be a Unix socket.
fn validate_agent_socket(socket: &Path) -> Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::metadata(socket) {
        Ok(meta) if meta.file_type().is_socket() => Ok(()),
        Ok(_) => Err(KeysignError::Usage(format!(
            "SSH_AUTH_SOCK ({}) is not a socket; is ssh-agent running?",
            socket.display()
        ))),
        Err(_) => Err(KeysignError::Usage(format!(
            "SSH_AUTH_SOCK ({}) does not exist; is ssh-agent running?",
            socket.display()
        ))),
    }
}

/// The key must be an existing file whose name ends in `.pub`.
fn validate_key_file(key: &str) -> Result<()> {
    let path = keysign_ssh::normalize_path(key)?;

    if path.extension().and_then(|e| e.to_str()) != Some("pub") {
        return Err(KeysignError::Usage(
            "only public key files are expected here. [Hint: name ending in .pub]".into(),
        ));
    }

    std::fs::metadata(&path)
        .map(|_| ())
        .map_err(|e| KeysignError::filesystem("reading key file", path, e))
}
