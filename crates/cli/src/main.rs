//! parley CLI, the main entry point.
//!
//! Commands:
//! - `serve`   Start the HTTP chat server
//! - `chat`    Interactive chat in the terminal
//! - `config`  Print the default, the effective, or the path of the config

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "parley: session-scoped chat with tool-calling models",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file to use instead of ~/.parley/config.toml
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Chat in the terminal
    Chat {
        /// Session id to use; a random one is generated otherwise
        #[arg(short, long)]
        session: Option<String>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
enum ConfigAction {
    /// Print a config file with every default filled in
    Default,
    /// Print the effective configuration (API keys redacted)
    Show,
    /// Print the config file path
    Path,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(config_path, host, port).await?,
        Commands::Chat { session, message } => {
            commands::chat::run(config_path, session, message).await?
        }
        Commands::Config { action } => {
            commands::config_cmd::run(config_path, action.unwrap_or(ConfigAction::Default))?
        }
    }

    Ok(())
}
