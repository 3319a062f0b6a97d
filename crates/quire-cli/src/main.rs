//! quire - command-line client for the quire proposal API.
//!
//! A thin wrapper over `quire-http`: each command opens the stored session,
//! does one thing through the authenticated transport or the streaming
//! session, and exits.

mod cli;
mod commands;
mod output;
mod session;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use commands::{generate, login, logout, refresh_token, request, whoami};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.json_logs);

    let session = session::open(&cli.global)?;

    match cli.command {
        Commands::Login(args) => login::run(args, session).await,
        Commands::Whoami(args) => whoami::run(args, session).await,
        Commands::Logout(args) => logout::run(args, session),
        Commands::RefreshToken(args) => refresh_token::run(args, session).await,
        Commands::Request(args) => request::run(args, session).await,
        Commands::Generate(args) => generate::run(args, session).await,
    }
}

fn init_logging(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so streamed text on stdout stays clean.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
