// ABOUTME: TOML config file loading and merging with command line flags
// ABOUTME: Precedence is flag > SSH_KEYSIGN_* environment > config file > built-in default

use crate::args::{CommonArgs, HostArgs, UserArgs};
use crate::error::CliError;
use keysign_core::{Config, HostConfig, OAuthConfig, UserConfig};
use keysign_log::{LogDestination, LogLevel, LogOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "ssh-keysign";
const CONFIG_FILE: &str = "config.toml";

/// Contents of `config.toml`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub ca_server_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_url: Option<String>,
    pub device_flow_url: Option<String>,
    pub token_poll_url: Option<String>,
    pub log_level: Option<String>,
    pub log_destination: Option<String>,
    #[serde(default)]
    pub host: FileFlow,
    #[serde(default)]
    pub user: FileFlow,
}

/// `[host]` / `[user]` table.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileFlow {
    pub key: Option<String>,
    #[serde(default)]
    pub principal: Principals,
    pub duration: Option<u64>,
    pub agent: Option<bool>,
}

/// `principal = "alice"` or `principal = ["alice", "admin"]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Principals {
    One(String),
    Many(Vec<String>),
}

impl Default for Principals {
    fn default() -> Self {
        Principals::Many(Vec::new())
    }
}

impl Principals {
    fn to_vec(&self) -> Vec<String> {
        match self {
            Principals::One(p) => split_principals(std::slice::from_ref(p)),
            Principals::Many(ps) => split_principals(ps),
        }
    }
}

/// Values resolved from the process environment at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Environment {
    pub agent_socket: Option<PathBuf>,
    pub ssh_dir: Option<PathBuf>,
    pub config_home: Option<PathBuf>,
}

impl Environment {
    pub fn detect() -> Self {
        let non_empty = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty());
        let home = dirs::home_dir();
        Self {
            agent_socket: non_empty("SSH_AUTH_SOCK").map(PathBuf::from),
            ssh_dir: home.as_ref().map(|h| h.join(".ssh")),
            config_home: non_empty("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|| home.map(|h| h.join(".config"))),
        }
    }

    /// `/etc/ssh-keysign/config.toml`
    pub fn host_config_path(&self) -> Option<PathBuf> {
        Some(Path::new("/etc").join(APP_DIR).join(CONFIG_FILE))
    }

    /// `$XDG_CONFIG_HOME/ssh-keysign/config.toml`, falling back to `~/.config`.
    pub fn user_config_path(&self) -> Option<PathBuf> {
        self.config_home
            .as_ref()
            .map(|d| d.join(APP_DIR).join(CONFIG_FILE))
    }
}

/// Load the config file. An explicit path must exist and parse; a missing
/// default file yields an empty configuration.
///
/// # Errors
/// Returns `CliError::ConfigRead` or `CliError::ConfigParse`.
pub fn load(explicit: Option<&Path>, default: Option<PathBuf>) -> Result<FileConfig, CliError> {
    let path = match (explicit, default) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(path)) if path.is_file() => path,
        (None, _) => return Ok(FileConfig::default()),
    };

    let content = std::fs::read_to_string(&path).map_err(|e| CliError::ConfigRead {
        path: path.clone(),
        source: e,
    })?;
    parse(&content).map_err(|e| CliError::ConfigParse { path, source: e })
}

pub fn parse(content: &str) -> Result<FileConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Expand `$VAR` / `${VAR}` in a config file value; undefined variables are left as written.
fn expand(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| {
        shellexpand::env(v)
            .map(|e| e.into_owned())
            .unwrap_or_else(|_| v.clone())
    })
}

fn pick(flag: &Option<String>, file: &Option<String>) -> Option<String> {
    flag.clone()
        .filter(|v| !v.is_empty())
        .or_else(|| expand(file))
}

fn split_principals(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn principals(flag: &[String], file: &Principals) -> Vec<String> {
    let from_flag = split_principals(flag);
    if from_flag.is_empty() {
        file.to_vec()
    } else {
        from_flag
    }
}

fn oauth(common: &CommonArgs, file: &FileConfig) -> OAuthConfig {
    OAuthConfig {
        server_url: pick(&common.ca_server_url, &file.ca_server_url),
        client_id: pick(&common.client_id, &file.client_id),
        client_secret: pick(&common.client_secret, &file.client_secret),
        token_url: pick(&common.token_url, &file.token_url),
        device_flow_url: expand(&file.device_flow_url),
        token_poll_url: expand(&file.token_poll_url),
    }
}

/// Configuration for `ssh-keysign host`.
pub fn host_config(args: &HostArgs, file: &FileConfig) -> Config {
    let defaults = HostConfig::default();
    Config {
        oauth: oauth(&args.common, file),
        host: HostConfig {
            key: pick(&args.key, &file.host.key),
            principals: principals(&args.principal, &file.host.principal),
            duration_seconds: args
                .duration
                .or(file.host.duration)
                .unwrap_or(defaults.duration_seconds),
        },
        user: UserConfig::default(),
    }
}

/// Configuration for `ssh-keysign user`.
pub fn user_config(args: &UserArgs, file: &FileConfig, env: &Environment) -> Config {
    let defaults = UserConfig::default();
    let mut oauth = oauth(&args.common, file);
    if let Some(url) = args.device_flow_url.clone().filter(|v| !v.is_empty()) {
        oauth.device_flow_url = Some(url);
    }
    if let Some(url) = args.token_poll_url.clone().filter(|v| !v.is_empty()) {
        oauth.token_poll_url = Some(url);
    }

    Config {
        oauth,
        host: HostConfig::default(),
        user: UserConfig {
            key: pick(&args.key, &file.user.key),
            principals: principals(&args.principal, &file.user.principal),
            duration_seconds: args
                .duration
                .or(file.user.duration)
                .unwrap_or(defaults.duration_seconds),
            agent: args.agent || file.user.agent.unwrap_or(false),
            agent_socket: env.agent_socket.clone(),
            ssh_dir: env.ssh_dir.clone(),
        },
    }
}

/// Logging options: flag or environment first, then the config file, then defaults.
///
/// # Errors
/// Returns `CliError::LogOption` if the config file names an unknown level or destination.
pub fn log_options(common: &CommonArgs, file: &FileConfig) -> Result<LogOptions, CliError> {
    let level = match (common.log_level, &file.log_level) {
        (Some(level), _) => level,
        (None, Some(level)) => level.parse::<LogLevel>()?,
        (None, None) => LogLevel::default(),
    };
    let destination = match (common.log_destination, &file.log_destination) {
        (Some(destination), _) => destination,
        (None, Some(destination)) => destination.parse::<LogDestination>()?,
        (None, None) => LogDestination::default(),
    };
    Ok(LogOptions { level, destination })
}
