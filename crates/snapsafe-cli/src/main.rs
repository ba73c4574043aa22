//! SnapSafe session tool - inspect and drive the local session state.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use snapsafe_config_and_utils::{init_logging, Config, Paths};

/// SnapSafe session command-line interface.
#[derive(Parser)]
#[command(name = "snapsafe-session")]
#[command(about = "Inspect and drive the SnapSafe local session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (store, logs, config). Defaults to ~/.snapsafe
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored session and the state it resolves to
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Store the alternate credential carried by a login redirect URL
    CompleteLogin {
        /// Redirect URL with `code`, `email` and `displayName` parameters
        redirect_url: String,
    },
    /// Clear every session key
    SignOut,
    /// Run the reconciler and print session events until Ctrl-C
    Watch {
        /// Start with this primary user signed in
        #[arg(long)]
        signed_in_as: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new().context("Failed to resolve the SnapSafe home directory")?,
    };
    let config = Config::load(&paths).context("Failed to load configuration")?;

    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, Some(paths.log_file()));

    match cli.command {
        Commands::Status { json } => commands::status(&config, &paths, json)?,
        Commands::CompleteLogin { redirect_url } => {
            commands::complete_login(&config, &paths, &redirect_url)?
        }
        Commands::SignOut => commands::sign_out(&config, &paths)?,
        Commands::Watch { signed_in_as } => {
            commands::watch(&config, &paths, signed_in_as).await?
        }
    }

    Ok(())
}
