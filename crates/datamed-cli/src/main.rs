//! DataMed session CLI - drives the client session lifecycle from a terminal.

mod commands;
mod listener;
mod output;

use clap::{Parser, Subcommand};
use datamed_config_and_utils::{Config, Paths};
use tracing::debug;

/// DataMed session CLI - log in, keep the session alive and log out.
#[derive(Parser)]
#[command(name = "datamed-session")]
#[command(about = "DataMed client session management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check authentication status (default)
    Status,

    /// Log in through the browser
    Login {
        /// Print the login URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Complete a login from the redirect URL the browser landed on
    Callback {
        /// Full redirect URL including code and state
        url: String,
    },

    /// Print the current access token
    Token,

    /// Refresh the access token
    Refresh {
        /// Refresh even if the token is still valid
        #[arg(long)]
        force: bool,
    },

    /// Logout and clear session
    Logout {
        /// Open the provider's end-session page in a browser
        #[arg(long)]
        open: bool,
    },

    /// Keep the session alive and print state changes
    Watch,

    /// Open the account registration page
    Register {
        /// Print the registration URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Check connectivity to the provider and the backend
    Doctor,
}

async fn run(cli: Cli, ctx: commands::Context) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => commands::status(&ctx, format).await,
        Commands::Login { no_browser } => commands::login(&ctx, format, no_browser).await,
        Commands::Callback { url } => commands::callback(&ctx, &url, format).await,
        Commands::Token => commands::token(&ctx, format).await,
        Commands::Refresh { force } => commands::refresh(&ctx, format, force).await,
        Commands::Logout { open } => commands::logout(&ctx, format, open).await,
        Commands::Watch => commands::watch(&ctx, format).await,
        Commands::Register { no_browser } => commands::register(&ctx, format, no_browser).await,
        Commands::Doctor => commands::doctor(&ctx, format).await,
    }
}

fn load() -> anyhow::Result<(Paths, Config)> {
    let paths = Paths::new()?;
    let config = Config::load(&paths)?;
    Ok((paths, config))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    let (paths, config) = match load() {
        Ok(loaded) => loaded,
        Err(e) => {
            output::print_error(&e.to_string(), format);
            std::process::exit(1);
        }
    };

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    datamed_config_and_utils::init_logging(&paths, &level);
    debug!(config = %paths.config_file().display(), "configuration loaded");

    let result = match commands::Context::new(paths, config) {
        Ok(ctx) => run(cli, ctx).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), format);
        std::process::exit(1);
    }
}
