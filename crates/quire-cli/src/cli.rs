//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::commands::{generate, login, logout, refresh_token, request, whoami};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Command-line client for the quire proposal API.
#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(author, version = env!("QUIRE_VERSION"), about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// API base URL
    #[arg(long, env = "QUIRE_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Token file (defaults to the platform data directory)
    #[arg(long, env = "QUIRE_TOKEN_FILE", global = true)]
    pub token_file: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and store the issued tokens
    Login(login::LoginArgs),

    /// Show the signed-in user
    Whoami(whoami::WhoamiArgs),

    /// Forget the stored tokens
    Logout(logout::LogoutArgs),

    /// Exchange the refresh token for a new pair
    RefreshToken(refresh_token::RefreshTokenArgs),

    /// Send an authenticated request to any endpoint
    Request(request::RequestArgs),

    /// Stream AI-generated text for a proposal section
    Generate(generate::GenerateArgs),
}
