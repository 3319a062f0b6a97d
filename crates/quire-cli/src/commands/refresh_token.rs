//! Refresh token command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use quire_http::AuthSession;

use crate::output;
use crate::session::require_login;

#[derive(Args, Debug)]
pub struct RefreshTokenArgs {}

pub async fn run(_args: RefreshTokenArgs, session: AuthSession) -> Result<()> {
    require_login(&session)?;

    eprintln!("{}", "Refreshing session...".dimmed());

    session
        .refresh()
        .await
        .context("Failed to refresh session")?;

    output::success("Session refreshed successfully");
    Ok(())
}
