// ABOUTME: Command implementations for the ssh-keysign binary
// ABOUTME: Resolves configuration, sets up logging and cancellation, runs the pipeline and maps exit codes

//! # keysign-cli
//!
//! The `ssh-keysign` binary:
//!
//! ```text
//! ssh-keysign
//! ├── host      # sign a host public key (client credentials)
//! ├── user      # sign a user key, optionally generated and loaded into ssh-agent
//! └── version   # show version info
//! ```
//!
//! ## Usage
//!
//! ```bash
//! ssh-keysign host -k /etc/ssh/ssh_host_ed25519_key.pub -p web01.example.com
//! ssh-keysign user -p alice --agent
//! ```

pub mod args;
pub mod error;
pub mod file_config;

use args::{Cli, Commands, CommonArgs, HostArgs, UserArgs};
use clap::CommandFactory;
use colored::Colorize;
use error::CliError;
use file_config::Environment;
use keysign_core::{CancellationToken, ErrorKind, Printer, Runner, Verbosity};
use tracing::warn;

/// Version of the ssh-keysign CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a parsed command line and return the process exit code.
pub async fn run(cli: Cli) -> i32 {
    let name = cli.command.name();
    let result = match cli.command {
        Commands::Host(args) => sign_host(args).await,
        Commands::User(args) => sign_user(args).await,
        Commands::Version => {
            println!("ssh-keysign {VERSION}");
            Ok(())
        }
    };

    match result {
        Ok(()) => 0,
        Err(err) => report(name, &err),
    }
}

async fn sign_host(args: HostArgs) -> Result<(), CliError> {
    let env = Environment::detect();
    let file = file_config::load(args.common.config.as_deref(), env.host_config_path())?;
    init_logging(&args.common, &file)?;

    let config = file_config::host_config(&args, &file);
    let printer = Printer::stdout(verbosity(&args.common));
    let cancel = cancel_on_ctrl_c();

    Runner::new(config)?
        .sign_host_key(&printer, &cancel)
        .await?;
    Ok(())
}

async fn sign_user(args: UserArgs) -> Result<(), CliError> {
    let env = Environment::detect();
    let file = file_config::load(args.common.config.as_deref(), env.user_config_path())?;
    init_logging(&args.common, &file)?;

    let config = file_config::user_config(&args, &file, &env);
    let printer = Printer::stdout(verbosity(&args.common));
    let cancel = cancel_on_ctrl_c();

    Runner::new(config)?
        .sign_user_key(&printer, &cancel)
        .await?;
    Ok(())
}

fn init_logging(common: &CommonArgs, file: &file_config::FileConfig) -> Result<(), CliError> {
    let options = file_config::log_options(common, file)?;
    keysign_log::init(&options);
    Ok(())
}

fn verbosity(common: &CommonArgs) -> Verbosity {
    Verbosity::from_flags(common.verbose, common.quiet)
}

/// Token that fires on Ctrl-C, aborting polling and in-flight requests.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, canceling");
            trigger.cancel();
        }
    });
    cancel
}

/// Print the error (after the subcommand help for usage errors) and return its exit code.
fn report(command: &str, err: &CliError) -> i32 {
    if err.kind() == ErrorKind::Usage {
        let mut cli = Cli::command();
        cli.build();
        if let Some(sub) = cli.find_subcommand_mut(command) {
            let _ = sub.print_help();
            println!();
        }
    }
    eprintln!("{} {err}", "Error:".red().bold());
    err.exit_code()
}
