// ABOUTME: Clap definitions for the ssh-keysign command line
// ABOUTME: host, user and version subcommands with SSH_KEYSIGN_* environment fallbacks

use clap::{ArgAction, Args, Parser, Subcommand};
use keysign_log::{LogDestination, LogLevel};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ssh-keysign")]
#[command(about = "Obtain short-lived SSH certificates from a CA using OAuth")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign a host public key using client credentials
    Host(HostArgs),

    /// Sign a user key (from a file or freshly generated)
    User(UserArgs),

    /// Show version information
    Version,
}

impl Commands {
    /// Subcommand name, used to look up its help text.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Host(_) => "host",
            Commands::User(_) => "user",
            Commands::Version => "version",
        }
    }
}

/// Flags shared by `host` and `user`.
#[derive(Args, Debug, Default, Clone)]
pub struct CommonArgs {
    /// Config file (defaults to /etc/ssh-keysign/config.toml for host,
    /// ~/.config/ssh-keysign/config.toml for user)
    #[arg(short, long, env = "SSH_KEYSIGN_CONFIG")]
    pub config: Option<PathBuf>,

    /// CA server base URL
    #[arg(long, env = "SSH_KEYSIGN_CA_SERVER_URL")]
    pub ca_server_url: Option<String>,

    /// OAuth client id
    #[arg(long, env = "SSH_KEYSIGN_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "SSH_KEYSIGN_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// OAuth token endpoint (client credentials grant)
    #[arg(long, env = "SSH_KEYSIGN_TOKEN_URL")]
    pub token_url: Option<String>,

    /// More output (-v progress, -vv also shows a truncated token)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Log level: error, warn, info or debug
    #[arg(long, env = "SSH_KEYSIGN_LOG_LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Log destination: stderr, stdout or file
    #[arg(long, env = "SSH_KEYSIGN_LOG_DESTINATION")]
    pub log_destination: Option<LogDestination>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct HostArgs {
    /// Host public key file (must end in .pub)
    #[arg(short, long, env = "SSH_KEYSIGN_HOST_KEY")]
    pub key: Option<String>,

    /// Principal (host name); repeatable or comma separated
    #[arg(short, long, value_delimiter = ',', env = "SSH_KEYSIGN_HOST_PRINCIPAL")]
    pub principal: Vec<String>,

    /// Certificate validity in seconds
    #[arg(short, long, env = "SSH_KEYSIGN_HOST_DURATION")]
    pub duration: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug, Default, Clone)]
pub struct UserArgs {
    /// User public key file; a new ed25519 key pair is generated when omitted
    #[arg(short, long, env = "SSH_KEYSIGN_USER_KEY")]
    pub key: Option<String>,

    /// Principal (user name); repeatable or comma separated
    #[arg(short, long, value_delimiter = ',', env = "SSH_KEYSIGN_USER_PRINCIPAL")]
    pub principal: Vec<String>,

    /// Certificate validity in seconds
    #[arg(short, long, env = "SSH_KEYSIGN_USER_DURATION")]
    pub duration: Option<u64>,

    /// OAuth device authorization endpoint
    #[arg(long, env = "SSH_KEYSIGN_DEVICE_FLOW_URL")]
    pub device_flow_url: Option<String>,

    /// OAuth token endpoint polled during the device flow
    #[arg(long, env = "SSH_KEYSIGN_TOKEN_POLL_URL")]
    pub token_poll_url: Option<String>,

    /// Load the generated key and certificate into ssh-agent instead of writing files
    #[arg(long, env = "SSH_KEYSIGN_USER_AGENT")]
    pub agent: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}
